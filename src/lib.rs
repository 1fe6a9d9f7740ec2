// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, config, email, security, utils};

// Re-export commonly used types
pub use modules::auth::{
    AccountStore, AuthContext, AuthError, AuthService, ErrorKind, Identity, RequestCredentials,
    SessionManager, SessionStore, TokenIssuer,
};
pub use modules::config::AuthConfig;
pub use modules::email::Notifier;

// Constants
pub const KEYRING_SERVICE: &str = "trailpass";
pub const ACCESS_COOKIE: &str = "jwt";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const REFRESH_PATH: &str = "/api/v1/users/refresh";
pub const RESET_PATH: &str = "/api/v1/users/resetPassword";

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
