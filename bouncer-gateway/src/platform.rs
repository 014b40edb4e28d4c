//! Platform classification and minimum-version gating.
//!
//! Platform is derived from the `user-agent` header: the brand's iOS
//! clients identify themselves via Alamofire-style agents, Android via
//! bare okhttp. Anything else is rejected upstream of attestation.

use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

pub const MINIMUM_IOS_VERSION: &str = "7.51.0";
pub const MINIMUM_ANDROID_VERSION: &str = "7.41.0";

static IOS_USER_AGENTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^Muzz/[7-8]\.\d+\.\d+ \(com\.muzmatch\.muzmatch; build:\d+; iOS \d+\.\d+\.\d+\) Alamofire/\d+\.\d+\.\d+$").unwrap(),
        Regex::new(r"^MuzzAlpha/[7-8]\.\d+\.\d+ \(com\.muzmatch\.muzmatch\.alpha; build:\d+; iOS \d+\.\d+\.\d+\) Alamofire/\d+\.\d+\.\d+$").unwrap(),
        Regex::new(r"^MuzzTestsUI-Runner/\d+\.\d+ \(com\.muzmatch\.muzmatchUITests\.xctrunner; build:\d+; iOS \d+\.\d+\.\d+\) Alamofire/\d+\.\d+\.\d+$").unwrap(),
    ]
});

static ANDROID_USER_AGENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^okhttp/\d+\.\d+\.\d+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn from_user_agent(user_agent: &str) -> Option<Self> {
        if ANDROID_USER_AGENT.is_match(user_agent) {
            return Some(Platform::Android);
        }
        if IOS_USER_AGENTS.iter().any(|re| re.is_match(user_agent)) {
            return Some(Platform::Ios);
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "android" => Some(Platform::Android),
            "ios" => Some(Platform::Ios),
            _ => None,
        }
    }

    pub fn minimum_version(&self) -> &'static str {
        match self {
            Platform::Android => MINIMUM_ANDROID_VERSION,
            Platform::Ios => MINIMUM_IOS_VERSION,
        }
    }
}

/// Whether `app_version` satisfies the platform minimum (SemVer `>=`).
///
/// Client version strings may carry a `v` prefix, and Android alpha builds
/// append an `a`; both are stripped before comparison. Unparseable versions
/// fail the gate.
pub fn meets_minimum_version(platform: Platform, app_version: &str) -> bool {
    let normalized = app_version
        .trim()
        .trim_start_matches('v')
        .trim_end_matches('a');

    let Ok(version) = Version::parse(normalized) else {
        return false;
    };
    // Minimum constants are well-formed.
    let minimum = Version::parse(platform.minimum_version()).unwrap();

    version >= minimum
}
