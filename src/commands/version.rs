use clap::Parser;
use std::fmt;

#[derive(Parser, Debug)]
pub struct Version {}

#[derive(Debug)]
struct Info {
    version: &'static str,
    target: &'static str,
}

// since we do not need a json library here we just create the json output manually
impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{
  \"version\": \"{}\",
  \"target\": \"{}\"
}}",
            self.version, self.target
        )
    }
}

impl Version {
    pub fn exec(&self) {
        let info = Info {
            version: env!("CARGO_PKG_VERSION"),
            target: std::env::consts::ARCH,
        };
        println!("{info}");
    }
}
