pub mod assist;
pub mod openai;

pub use openai::ProviderClient;
