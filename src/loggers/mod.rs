pub mod dnstap_sender;
pub mod stdout;
pub mod syslog;
pub mod tcp;
