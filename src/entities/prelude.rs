pub use super::generated_images::Entity as GeneratedImages;
pub use super::sessions::Entity as Sessions;
pub use super::users::Entity as Users;
