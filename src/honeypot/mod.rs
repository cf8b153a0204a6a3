// Honeypot service implementations
// One impersonator per protocol the operator can enable

pub mod http;
pub mod mysql;
pub mod rdp;
pub mod ssh;
