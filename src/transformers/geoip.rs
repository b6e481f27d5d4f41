//! MMDB-backed geo/ASN enrichment, grounded on `transformers/geoip.go`.
//! Built on `maxminddb` since neither the teacher nor the rest of the pack
//! carries its own MaxMind reader.

use std::net::IpAddr;

use maxminddb::{geoip2, Reader};
use serde::Deserialize;

use crate::config::transformers::GeoIpConfig;
use crate::dnsmessage::DNSMessage;
use crate::error::{DcError, DcResult};

use super::{Decision, Transformer};

#[derive(Deserialize)]
struct AsnRecord<'a> {
    autonomous_system_number: Option<u32>,
    #[serde(borrow)]
    autonomous_system_organization: Option<&'a str>,
}

pub struct GeoIp {
    country: Option<Reader<Vec<u8>>>,
    city: Option<Reader<Vec<u8>>>,
    asn: Option<Reader<Vec<u8>>>,
}

impl GeoIp {
    pub fn from_config(config: &GeoIpConfig) -> DcResult<Self> {
        Ok(Self {
            country: open(config.db_country.as_deref())?,
            city: open(config.db_city.as_deref())?,
            asn: open(config.db_asn.as_deref())?,
        })
    }

    fn lookup(&self, ip: IpAddr, dm: &mut DNSMessage) {
        if let Some(city_db) = &self.city {
            if let Ok(city) = city_db.lookup::<geoip2::City>(ip) {
                if let Some(continent) = city.continent.as_ref().and_then(|c| c.code) {
                    dm.geo.continent = continent.to_string();
                }
                if let Some(country) = city.country.as_ref().and_then(|c| c.iso_code) {
                    dm.geo.country_iso_code = country.to_string();
                }
                if let Some(name) = city
                    .city
                    .as_ref()
                    .and_then(|c| c.names.as_ref())
                    .and_then(|names| names.get("en"))
                {
                    dm.geo.city = name.to_string();
                }
                return;
            }
        }
        if let Some(country_db) = &self.country {
            if let Ok(country) = country_db.lookup::<geoip2::Country>(ip) {
                if let Some(continent) = country.continent.as_ref().and_then(|c| c.code) {
                    dm.geo.continent = continent.to_string();
                }
                if let Some(iso_code) = country.country.as_ref().and_then(|c| c.iso_code) {
                    dm.geo.country_iso_code = iso_code.to_string();
                }
            }
        }
    }

    fn lookup_asn(&self, ip: IpAddr, dm: &mut DNSMessage) {
        let Some(asn_db) = &self.asn else { return };
        if let Ok(record) = asn_db.lookup::<AsnRecord>(ip) {
            dm.network.as_number = record.autonomous_system_number;
            dm.network.as_org = record.autonomous_system_organization.map(str::to_string);
        }
    }
}

fn open(path: Option<&str>) -> DcResult<Option<Reader<Vec<u8>>>> {
    let Some(path) = path else { return Ok(None) };
    Reader::open_readfile(path)
        .map(Some)
        .map_err(|e| DcError::config(format!("opening geoip database {path}: {e}")))
}

impl Transformer for GeoIp {
    fn name(&self) -> &'static str {
        "geoip"
    }

    fn process(&mut self, dm: &mut DNSMessage) -> Decision {
        if let Some(ip) = dm.network.query_ip {
            self.lookup(ip, dm);
            self.lookup_asn(ip, dm);
        }
        Decision::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_databases_configured_is_a_no_op() {
        let mut t = GeoIp::from_config(&GeoIpConfig::default()).unwrap();
        let mut dm = DNSMessage::new();
        dm.network.query_ip = Some("8.8.8.8".parse().unwrap());
        assert_eq!(t.process(&mut dm), Decision::Keep);
        assert_eq!(dm.geo.country_iso_code, "");
    }
}
