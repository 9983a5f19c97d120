//! Capability mock synthesis.
//!
//! Test code hands the host application "just enough" of an interface to
//! pass capability checks without re-implementing the whole contract.
//! Abstract members are intentionally inert rather than silently no-op: a
//! test that exercises an un-stubbed path fails loudly instead of passing
//! spuriously.

mod descriptor;
mod synth;

pub use descriptor::{AbstractMember, InterfaceDescriptor, MemberKind};
pub use synth::{make_mock, Attr, Mock, MockBuilder};
