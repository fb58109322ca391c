pub mod prelude;

pub mod generated_images;
pub mod sessions;
pub mod users;
