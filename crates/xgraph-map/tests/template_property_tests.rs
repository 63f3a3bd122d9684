use proptest::prelude::*;
use xgraph_map::generator::template::{percent_encode, Template};

fn decode(encoded: &str) -> Vec<u8> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
            out.push(u8::from_str_radix(hex, 16).unwrap());
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn default_expansion_leaves_only_unreserved_characters(value in ".*") {
        let encoded = percent_encode(&value, false);
        prop_assert!(encoded
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-._~%".contains(&b)));
        prop_assert_eq!(decode(&encoded), value.as_bytes().to_vec());
    }

    #[test]
    fn placeholders_receive_resolved_values_not_pattern_text(value in "[a-zA-Z0-9 /]{0,20}") {
        let template = Template::parse("item/{xpath:id}").unwrap();
        let expanded = template
            .expand(true, |p| -> Result<String, ()> {
                assert_eq!(p.name, "id");
                Ok(value.clone())
            })
            .unwrap();
        prop_assert!(!expanded.contains("xpath"));
        prop_assert_eq!(expanded, format!("item/{}", percent_encode(&value, false)));
    }

    #[test]
    fn reserved_expansion_keeps_slashes(segments in proptest::collection::vec("[a-z]{1,5}", 1..4)) {
        let value = segments.join("/");
        let template = Template::parse("{+rest}").unwrap();
        let expanded = template.expand(true, |_| -> Result<String, ()> { Ok(value.clone()) }).unwrap();
        prop_assert_eq!(expanded, value);
    }

    #[test]
    fn literal_text_survives_simple_templates(prefix in "[a-z ]{0,10}", value in "[^{}]{0,10}") {
        let pattern = format!("{prefix}{{name}}");
        let template = Template::parse(&pattern).unwrap();
        let expanded = template.expand(false, |_| -> Result<String, ()> { Ok(value.clone()) }).unwrap();
        prop_assert_eq!(expanded, format!("{prefix}{value}"));
    }
}
