use proptest::prelude::*;

use anthem_core::derivation::{derive_address, to_account_address, to_validator_address};
use anthem_core::tx::builder::{base_to_display, canonical_json_bytes, display_to_base};
use anthem_core::types::Network;

fn any_compressed_key() -> impl Strategy<Value = Vec<u8>> {
    (prop::bool::ANY, prop::array::uniform32(any::<u8>())).prop_map(|(odd, body)| {
        let mut key = vec![if odd { 0x03 } else { 0x02 }];
        key.extend_from_slice(&body);
        key
    })
}

proptest! {
    #[test]
    fn base_display_conversion_roundtrips(raw in 1u64..=u64::MAX) {
        let base = raw.to_string();
        let display = base_to_display(&base, Network::Cosmos).unwrap();
        let back = display_to_base(&display, Network::Cosmos).unwrap();
        prop_assert_eq!(back, base);
    }

    #[test]
    fn display_amounts_never_gain_precision(
        integer in 0u64..1_000_000,
        fraction in 0u32..1_000_000,
    ) {
        let display = format!("{}.{:06}", integer, fraction);
        let base = display_to_base(&display, Network::Cosmos).unwrap();
        let expected = integer as u128 * 1_000_000 + fraction as u128;
        prop_assert_eq!(base, expected.to_string());
    }

    #[test]
    fn validator_address_conversion_roundtrips(key in any_compressed_key()) {
        let account = derive_address(Network::Cosmos, &key).unwrap().address;
        prop_assert!(account.starts_with("cosmos1"));

        let valoper = to_validator_address(&account, Network::Cosmos).unwrap();
        prop_assert!(valoper.starts_with("cosmosvaloper1"));

        let back = to_account_address(&valoper, Network::Cosmos).unwrap();
        prop_assert_eq!(back, account);
    }

    #[test]
    fn same_key_same_payload_across_prefixes(key in any_compressed_key()) {
        let cosmos = derive_address(Network::Cosmos, &key).unwrap().address;
        let kava = derive_address(Network::Kava, &key).unwrap().address;

        // The data part (minus prefix and checksum) encodes the same hash
        let cosmos_body = cosmos.trim_start_matches("cosmos1");
        let kava_body = kava.trim_start_matches("kava1");
        prop_assert_eq!(&cosmos_body[..32], &kava_body[..32]);
    }

    #[test]
    fn canonical_json_is_order_insensitive(
        entries in prop::collection::vec(("[a-z]{1,8}", 0u32..1000), 1..8),
    ) {
        let mut forward = serde_json::Map::new();
        for (k, v) in &entries {
            forward.insert(k.clone(), serde_json::json!(v));
        }

        let mut reverse = serde_json::Map::new();
        for (k, v) in entries.iter().rev() {
            reverse.insert(k.clone(), serde_json::json!(v));
        }

        let a = canonical_json_bytes(&serde_json::Value::Object(forward));
        let b = canonical_json_bytes(&serde_json::Value::Object(reverse));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn canonical_json_drops_nulls(key in "[a-z]{1,8}") {
        let value = serde_json::json!({ &key: null, "kept": 1 });
        let bytes = canonical_json_bytes(&value);
        let s = String::from_utf8(bytes).unwrap();
        prop_assert_eq!(s, r#"{"kept":1}"#.to_string());
    }
}
