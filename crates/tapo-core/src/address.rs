//! Configured network addresses and their validation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a configured address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    #[serde(rename = "IP", alias = "ip")]
    Ip,
    #[serde(rename = "MAC", alias = "mac")]
    Mac,
    /// Anything else found in configuration; never valid
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "IP"),
            Self::Mac => write!(f, "MAC"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A configured IP or MAC address identifying a target device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressDescriptor {
    pub value: String,
    #[serde(rename = "type")]
    pub kind: AddressKind,
}

impl AddressDescriptor {
    pub fn ip(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: AddressKind::Ip,
        }
    }

    pub fn mac(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: AddressKind::Mac,
        }
    }

    /// Check that `value` is well-formed for `kind`
    pub fn is_valid(&self) -> bool {
        validate(self)
    }
}

impl fmt::Display for AddressDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.value)
    }
}

/// Total predicate over address descriptors.
///
/// IPv4 addresses are four dot-separated decimal octets of one to three
/// digits each, in 0..=255. MAC addresses are six two-digit hex groups
/// separated by `:` or `-`, in any case.
pub fn validate(address: &AddressDescriptor) -> bool {
    match address.kind {
        AddressKind::Ip => is_valid_ipv4(&address.value),
        AddressKind::Mac => is_valid_mac(&address.value),
        AddressKind::Unknown => false,
    }
}

fn is_valid_ipv4(value: &str) -> bool {
    let octets: Vec<&str> = value.split('.').collect();
    if octets.len() != 4 {
        return false;
    }

    octets.iter().all(|octet| {
        (1..=3).contains(&octet.len())
            && octet.bytes().all(|b| b.is_ascii_digit())
            && octet.parse::<u16>().map(|n| n <= 255).unwrap_or(false)
    })
}

fn is_valid_mac(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 17 {
        return false;
    }

    bytes.iter().enumerate().all(|(i, b)| {
        if i % 3 == 2 {
            *b == b':' || *b == b'-'
        } else {
            b.is_ascii_hexdigit()
        }
    })
}

/// A MAC address normalized to lowercase, colon-separated, zero-padded form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Normalize a MAC as reported by configuration or a neighbor table.
    ///
    /// Accepts `:` or `-` separators and one or two hex digits per group
    /// (BSD `arp -a` drops leading zeros).
    pub fn parse(value: &str) -> Option<Self> {
        let groups: Vec<&str> = value.trim().split([':', '-']).collect();
        if groups.len() != 6 {
            return None;
        }

        let mut normalized = String::with_capacity(17);
        for (i, group) in groups.iter().enumerate() {
            if group.is_empty() || group.len() > 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            if i > 0 {
                normalized.push(':');
            }
            if group.len() == 1 {
                normalized.push('0');
            }
            normalized.push_str(&group.to_ascii_lowercase());
        }

        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid MAC address: {value}"))
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ipv4() {
        for ip in ["192.168.1.5", "0.0.0.0", "255.255.255.255", "10.0.0.09", "001.2.3.4"] {
            assert!(validate(&AddressDescriptor::ip(ip)), "{ip} should be valid");
        }
    }

    #[test]
    fn test_invalid_ipv4() {
        for ip in [
            "",
            "256.1.1.1",
            "1.2.3",
            "1.2.3.4.5",
            "1.2.3.4 ",
            " 1.2.3.4",
            "1.2.3.4x",
            "1..3.4",
            "1.2.3.1000",
            "+1.2.3.4",
            "a.b.c.d",
            "１.2.3.4",
        ] {
            assert!(!validate(&AddressDescriptor::ip(ip)), "{ip:?} should be invalid");
        }
    }

    #[test]
    fn test_valid_mac() {
        for mac in ["AA:BB:CC:DD:EE:FF", "aa-bb-cc-dd-ee-ff", "0a:1B:2c:3D:4e:5F", "aa:bb-cc:dd-ee:ff"] {
            assert!(validate(&AddressDescriptor::mac(mac)), "{mac} should be valid");
        }
    }

    #[test]
    fn test_invalid_mac() {
        for mac in [
            "",
            "aa:bb:cc:dd:ee",
            "aa:bb:cc:dd:ee:ff:00",
            "aa:bb:cc:dd:ee:fg",
            "aabb.ccdd.eeff",
            "a:b:c:d:e:f",
            "aa:bb:cc:dd:ee:ff ",
            "aa_bb_cc_dd_ee_ff",
        ] {
            assert!(!validate(&AddressDescriptor::mac(mac)), "{mac:?} should be invalid");
        }
    }

    #[test]
    fn test_kind_mismatch_is_invalid() {
        assert!(!validate(&AddressDescriptor::ip("aa:bb:cc:dd:ee:ff")));
        assert!(!validate(&AddressDescriptor::mac("192.168.1.5")));
        assert!(!validate(&AddressDescriptor {
            value: "192.168.1.5".to_string(),
            kind: AddressKind::Unknown,
        }));
    }

    #[test]
    fn test_arbitrary_strings_rejected() {
        // Deterministic pseudo-random byte strings; none can match either grammar
        // because they all contain a byte outside [0-9a-fA-F.:-].
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..500 {
            let len = (seed % 24) as usize + 1;
            let mut bytes = Vec::with_capacity(len);
            for _ in 0..len {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                bytes.push((seed >> 16) as u8);
            }
            bytes[0] = b'z';
            let value = String::from_utf8_lossy(&bytes).into_owned();
            assert!(!validate(&AddressDescriptor::ip(value.clone())));
            assert!(!validate(&AddressDescriptor::mac(value)));
        }
    }

    #[test]
    fn test_descriptor_deserialize() {
        let json = r#"[{"value":"10.0.0.9","type":"IP"},{"value":"AA:BB:CC:DD:EE:FF","type":"MAC"},{"value":"x","type":"HOSTNAME"}]"#;
        let addresses: Vec<AddressDescriptor> = serde_json::from_str(json).unwrap();
        assert_eq!(addresses[0], AddressDescriptor::ip("10.0.0.9"));
        assert_eq!(addresses[1].kind, AddressKind::Mac);
        assert_eq!(addresses[2].kind, AddressKind::Unknown);
        assert!(!addresses[2].is_valid());
    }

    #[test]
    fn test_mac_normalization() {
        let a = MacAddress::parse("AA-BB-CC-DD-EE-FF").unwrap();
        let b = MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "aa:bb:cc:dd:ee:ff");

        let padded = MacAddress::parse("a:b:c:d:e:f").unwrap();
        assert_eq!(padded.as_str(), "0a:0b:0c:0d:0e:0f");

        assert!(MacAddress::parse("aa:bb:cc:dd:ee").is_none());
        assert!(MacAddress::parse("aaa:bb:cc:dd:ee:ff").is_none());
        assert!(MacAddress::parse("").is_none());
    }
}
