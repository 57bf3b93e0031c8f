//! Coverage decisions over an immutable service catalog.

mod catalog;
mod engine;
mod verdict;

pub use catalog::{
    AgeRange, CatalogError, CoverageEntry, Provider, Service, ServiceCatalog, SpecialRule,
    SERVICE_PREFIX,
};
pub use engine::decide;
pub use verdict::{format_clp, CoverageClass, NextAction, PaymentInfo, Verdict};
