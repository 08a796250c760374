pub mod admin;
pub mod client_ip;
pub mod tenant;

pub use admin::admin_auth_middleware;
pub use client_ip::ClientIp;
pub use tenant::session_middleware;
