#![cfg_attr(not(feature = "std"), no_std)]

pub mod rules;
pub mod scheduling;

pub use rules::*;
pub use scheduling::*;
