//! Best-effort device classification from a User-Agent header.
//!
//! This is a token heuristic, not a fingerprint: clients can send anything.

use tollgate_db_entities::ActiveSession::DeviceType;

const TABLET_TOKENS: &[&str] = &["ipad", "tablet", "kindle", "silk/", "playbook"];

const MOBILE_TOKENS: &[&str] = &[
    "mobile",
    "iphone",
    "ipod",
    "android",
    "ios",
    "windows phone",
    // iOS proxy clients
    "shadowrocket",
    "quantumult",
    "surge",
    "stash",
    "loon",
    // Android proxy clients
    "v2rayng",
    "nekobox",
    "clashmeta",
    "sfa/",
];

pub fn classify_user_agent(user_agent: &str) -> DeviceType {
    let ua = user_agent.trim().to_lowercase();
    if ua.is_empty() {
        return DeviceType::Unknown;
    }

    if TABLET_TOKENS.iter().any(|t| ua.contains(t)) {
        return DeviceType::Tablet;
    }

    // Android tablets omit "mobile" from their browser UA
    if ua.contains("android") && !ua.contains("mobile") && ua.contains("mozilla") {
        return DeviceType::Tablet;
    }

    if MOBILE_TOKENS.iter().any(|t| ua.contains(t)) {
        return DeviceType::Mobile;
    }

    DeviceType::Desktop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_unknown() {
        assert_eq!(classify_user_agent(""), DeviceType::Unknown);
        assert_eq!(classify_user_agent("   "), DeviceType::Unknown);
    }

    #[test]
    fn test_browsers() {
        assert_eq!(
            classify_user_agent(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148"
            ),
            DeviceType::Mobile
        );
        assert_eq!(
            classify_user_agent("Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15"),
            DeviceType::Tablet
        );
        assert_eq!(
            classify_user_agent("Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Safari/537.36"),
            DeviceType::Tablet
        );
        assert_eq!(
            classify_user_agent(
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Mobile Safari/537.36"
            ),
            DeviceType::Mobile
        );
        assert_eq!(
            classify_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Gecko/20100101 Firefox/126.0"),
            DeviceType::Desktop
        );
    }

    #[test]
    fn test_proxy_clients() {
        assert_eq!(classify_user_agent("Shadowrocket/2070 CFNetwork/1494"), DeviceType::Mobile);
        assert_eq!(classify_user_agent("v2rayNG/1.8.19"), DeviceType::Mobile);
        assert_eq!(classify_user_agent("clash-verge/v1.7.7"), DeviceType::Desktop);
    }
}
