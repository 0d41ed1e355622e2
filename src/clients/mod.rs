pub mod memory_store;
pub mod rest_store;
pub mod store;
pub mod webhook_client;

pub use memory_store::MemoryStore;
pub use rest_store::RestStore;
pub use store::{tables, DataStore, Query};
pub use webhook_client::{
    get_api_base, AnalysisBackend, AnalysisRequest, AnalysisTarget, Endpoint, ExerciseChannel,
    WebhookClient,
};
