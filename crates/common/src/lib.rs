// vellum-common: pure domain logic shared across the Vellum workspace

pub mod edit;
pub mod error;
pub mod markdown;
pub mod types;
pub mod version;
