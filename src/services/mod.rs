pub mod auth_service;
pub mod auth_service_impl;
pub mod caption;
pub mod generation;

pub use auth_service::{AuthError, AuthService, LoginResult, UserData};
pub use auth_service_impl::SeaOrmAuthService;
pub use caption::{CaptionResult, CaptionService};
pub use generation::{GeneratedImage, GenerateParams, GenerationError, GenerationService, Mode};
