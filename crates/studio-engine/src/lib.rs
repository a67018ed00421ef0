pub mod assets;
pub mod orchestrator;
pub mod prompts;
pub mod response;
pub mod transport;
pub mod views;

pub use assets::{GeneratedImage, ImageAsset};
pub use orchestrator::Orchestrator;
pub use response::ModelResponse;
pub use transport::{
    default_transport_registry, ContentRequest, DryrunTransport, GeminiTransport,
    GenerationTransport, TransportRegistry,
};
pub use views::{AppState, AppView, ComposeDraft, RestoreDraft};
