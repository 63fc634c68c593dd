//! URL handling for Sumi-Harvest
//!
//! Normalization keeps link variants of one page from becoming separate
//! tasks; domain helpers let spiders stay on the site they started from.

mod domain;
mod normalize;

pub use domain::{extract_domain, within_domain};
pub use normalize::normalize_url;
