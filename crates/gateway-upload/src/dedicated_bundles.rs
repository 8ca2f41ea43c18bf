//! The dedicated-bundle policy table (`spec.md` §6, §9 glossary).
//!
//! A handful of well-known application tags route to their own exclusive
//! bundle rather than being packed alongside arbitrary traffic, so a single
//! misbehaving high-volume uploader can never delay someone else's items.
//! `plan-bundle` groups strictly by `premiumFeatureType`; this module is
//! where that tag is derived at ingest time, once, from the envelope's
//! signature type and tags.

use gateway_types::ans104::SignatureType;
use gateway_types::lifecycle::PremiumFeatureType;
use gateway_types::tags::Tag;

/// `(policy name, tag name to match, tag value to match)`. Checked in order;
/// the first match wins.
const TAG_POLICIES: &[(&str, &str, &str)] = &[
    ("warp", "App-Name", "Warp"),
    ("warp", "App-Name", "SmartWeaveContract"),
    ("redstone-oracle", "App-Name", "Redstone"),
    ("first-batch", "Bundler-App-Name", "first-batch"),
    ("ao", "Data-Protocol", "ao"),
    ("ardrive", "App-Name", "ArDrive"),
    ("ardrive", "App-Name", "ArDrive-Web"),
    ("ardrive", "App-Name", "ArDrive-Desktop"),
    ("ario", "App-Name", "AR.IO"),
    ("ario", "App-Name", "AR.IO Gateway"),
];

/// Classifies a data item into a dedicated-bundle policy, if any.
///
/// `Kyve`-signed items are always routed to the `kyve` dedicated bundle
/// regardless of tags, since the signature type itself identifies the
/// upstream oracle network.
pub fn classify(signature_type: SignatureType, tags: &[Tag]) -> Option<PremiumFeatureType> {
    if signature_type == SignatureType::Kyve {
        return Some(PremiumFeatureType("kyve".to_string()));
    }
    for (policy, tag_name, tag_value) in TAG_POLICIES {
        if tags.iter().any(|t| t.name == *tag_name && t.value == *tag_value) {
            return Some(PremiumFeatureType((*policy).to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kyve_signature_type_always_routes_to_kyve_bundle() {
        let classified = classify(SignatureType::Kyve, &[]);
        assert_eq!(classified.unwrap().as_str(), "kyve");
    }

    #[test]
    fn warp_app_name_tag_routes_to_warp_bundle() {
        let tags = vec![Tag::new("App-Name", "Warp")];
        let classified = classify(SignatureType::Arweave, &tags);
        assert_eq!(classified.unwrap().as_str(), "warp");
    }

    #[test]
    fn unrecognized_tags_have_no_dedicated_bundle() {
        let tags = vec![Tag::new("Content-Type", "text/plain")];
        assert!(classify(SignatureType::Arweave, &tags).is_none());
    }
}
