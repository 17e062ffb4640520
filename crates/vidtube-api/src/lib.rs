pub mod auth;
pub mod convert;
pub mod error;
pub mod listing;
pub mod middleware;
pub mod ownership;
pub mod playlists;
pub mod response;
pub mod routes;
pub mod state;
pub mod tokens;
pub mod tweets;
pub mod uploads;
pub mod users;
pub mod videos;

pub use error::{ApiError, ApiResult, expose_error_details};
pub use routes::router;
pub use state::{AppState, AppStateInner};
pub use tokens::TokenService;
