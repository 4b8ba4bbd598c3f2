//! Helper types for amounts and addresses.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`wei_amount`] | Non-negative integer amounts in the smallest native unit |
//! | [`address`] | Lower-cased wallet addresses used as ledger keys |

pub mod address;
pub mod wei_amount;

pub use address::*;
pub use wei_amount::*;
