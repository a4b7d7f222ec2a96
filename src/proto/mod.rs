//! Issue/Redeem token protocol (C4, §4.4) and its JSON wire types (§6).

pub mod issue;
pub mod redeem;
pub mod wire;

pub use issue::handle_issue;
pub use redeem::{handle_redeem, verify_redeem, RedeemStatus};
pub use wire::{BlindTokenRequest, BlindTokenRequestWrapper, IssueResponse, RequestType};
