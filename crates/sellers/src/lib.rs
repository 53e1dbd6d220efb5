//! Seller identity: registration and profile lifecycle.
//!
//! Sellers are never deleted while commission or withdrawal history exists;
//! there is deliberately no removal command.

pub mod seller;

pub use seller::{
    RegisterSeller, RenameSeller, Seller, SellerCommand, SellerEvent, SellerRegistered,
    SellerRenamed,
};
