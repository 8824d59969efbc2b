//! Freemius API endpoints
//!
//! The login endpoint is the only one this workspace calls. The local root
//! is the Freemius developer sandbox, selected with `use_local_api`.

/// Production API root
pub const PRODUCTION_API_ROOT: &str = "https://fast-api.freemius.com";

/// Local development API root
pub const LOCAL_API_ROOT: &str = "http://api.freemius-local.com:8080";

/// Email + password login endpoint, relative to the API root
pub const LOGIN_PATH: &str = "/v1/users/login.json";
