pub mod io;
pub mod logging;
pub mod time;

pub use io::{is_valid_email, normalize_email, read_line};
pub use logging::{initialize_logging, log_auth_event};
pub use time::{format_duration, Clock, ManualClock, SystemClock};
