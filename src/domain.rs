//! Core domain model: product records, the field normalizer, and the error
//! taxonomy. Everything here is I/O-free.

pub mod errors;
pub mod normalize;
pub mod product;

pub use errors::ScrapeError;
pub use normalize::{Normalizer, NormalizerConfig};
pub use product::{
    FreeShipping, ParseStatus, PriceSnapshot, ProductSnapshot, RawPrice, RawProduct,
};
