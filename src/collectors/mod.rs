pub mod dnsmessage;
pub mod dnstap;
pub mod powerdns;
