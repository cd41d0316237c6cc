//! WLAN connection profile descriptor.

use std::fmt;

/// Authentication chosen for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Open,
    Wpa2Psk,
}

/// Everything needed to store a connection profile for one access point.
#[derive(Clone, PartialEq, Eq)]
pub struct ProfileDescriptor {
    pub ssid: String,
    password: Option<String>,
}

impl fmt::Debug for ProfileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileDescriptor")
            .field("ssid", &self.ssid)
            .field("security", &self.security())
            .finish()
    }
}

impl ProfileDescriptor {
    /// An empty password selects an open network.
    pub fn new(ssid: &str, password: Option<&str>) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    pub fn security(&self) -> Security {
        if self.password.is_some() {
            Security::Wpa2Psk
        } else {
            Security::Open
        }
    }

    /// Render as a Windows WLAN profile document.
    ///
    /// The pre-shared key is embedded as plain `keyMaterial` with
    /// `protected=false`. Whoever writes this to disk is holding a secret.
    pub fn to_xml(&self) -> String {
        let name = escape_xml(&self.ssid);
        let security = match &self.password {
            None => "      <authEncryption>
        <authentication>open</authentication>
        <encryption>none</encryption>
        <useOneX>false</useOneX>
      </authEncryption>"
                .to_string(),
            Some(key) => format!(
                "      <authEncryption>
        <authentication>WPA2PSK</authentication>
        <encryption>AES</encryption>
        <useOneX>false</useOneX>
      </authEncryption>
      <sharedKey>
        <keyType>passPhrase</keyType>
        <protected>false</protected>
        <keyMaterial>{}</keyMaterial>
      </sharedKey>",
                escape_xml(key)
            ),
        };

        format!(
            r#"<?xml version="1.0"?>
<WLANProfile xmlns="http://www.microsoft.com/networking/WLAN/profile/v1">
  <name>{name}</name>
  <SSIDConfig>
    <SSID>
      <name>{name}</name>
    </SSID>
  </SSIDConfig>
  <connectionType>ESS</connectionType>
  <connectionMode>auto</connectionMode>
  <MSM>
    <security>
{security}
    </security>
  </MSM>
</WLANProfile>
"#
        )
    }
}

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_profile() {
        let descriptor = ProfileDescriptor::new("ExpressLRS RX", None);
        let xml = descriptor.to_xml();

        assert_eq!(descriptor.security(), Security::Open);
        assert!(xml.contains("<name>ExpressLRS RX</name>"));
        assert!(xml.contains("<authentication>open</authentication>"));
        assert!(!xml.contains("sharedKey"));
    }

    #[test]
    fn test_empty_password_is_open() {
        let descriptor = ProfileDescriptor::new("RX", Some(""));
        assert_eq!(descriptor.security(), Security::Open);
    }

    #[test]
    fn test_wpa2_profile_embeds_escaped_key() {
        let descriptor = ProfileDescriptor::new("R&D <lab>", Some("p\"w'd"));
        let xml = descriptor.to_xml();

        assert_eq!(descriptor.security(), Security::Wpa2Psk);
        assert!(xml.contains("<name>R&amp;D &lt;lab&gt;</name>"));
        assert!(xml.contains("<authentication>WPA2PSK</authentication>"));
        assert!(xml.contains("<encryption>AES</encryption>"));
        assert!(xml.contains("<keyMaterial>p&quot;w&apos;d</keyMaterial>"));
    }

    #[test]
    fn test_debug_hides_key() {
        let descriptor = ProfileDescriptor::new("RX", Some("expresslrs"));
        let debug = format!("{:?}", descriptor);
        assert!(debug.contains("Wpa2Psk"));
        assert!(!debug.contains("expresslrs"));
    }
}
