pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Specialist, SpecialistError};
pub use services::DirectoryService;
