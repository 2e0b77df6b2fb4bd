pub mod polynomial;
pub mod sip;

pub use sip::{SipDistortion, SipMatrix};
