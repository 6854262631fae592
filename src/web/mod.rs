pub mod auth;
pub mod dashboard;
pub mod landing;
pub mod media;
pub mod responses;
pub mod router;
pub mod state;
pub mod templates;
pub mod uploads;

pub use responses::ApiError;
pub use state::AppState;
pub use templates::{NavLink, PageLayout, escape_html, render_flash, render_page};
pub use uploads::{FileFieldConfig, UploadOutcome, read_upload_form};
