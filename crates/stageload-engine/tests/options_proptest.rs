use proptest::prelude::*;
use serde_json::{Map, Value};
use stageload_engine::location::{render_template, LoadPeriod};
use stageload_engine::options::{compile_options, CopyOptions};
use stageload_types::dataset::OptionSource;

fn option_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        ".{0,24}".prop_map(Value::String),
    ]
}

fn option_map() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[A-Za-z_][A-Za-z0-9_]{0,12}", option_value(), 0..6).prop_map(
        |entries| {
            // Keys differing only in case would collide after folding.
            let mut map = Map::new();
            for (key, value) in entries {
                if !map.keys().any(|k: &String| k.eq_ignore_ascii_case(&key)) {
                    map.insert(key, value);
                }
            }
            map
        },
    )
}

proptest! {
    #[test]
    fn rendered_options_parse_back(map in option_map()) {
        let options = CopyOptions::from_source(&OptionSource::Mapping(map.clone()))
            .expect("generated options must be valid");
        let rendered = options.render();

        let parsed = CopyOptions::parse_rendered(&rendered).expect("rendered options must parse");
        prop_assert_eq!(&parsed, &options);
        prop_assert_eq!(parsed.len(), map.len());
        prop_assert_eq!(rendered.lines().count(), map.len());
    }

    #[test]
    fn overrides_win_over_defaults(
        defaults in option_map(),
        overrides in option_map(),
    ) {
        let default_options = CopyOptions::from_source(&OptionSource::Mapping(defaults.clone()))
            .expect("generated defaults must be valid");
        let override_options = CopyOptions::from_source(&OptionSource::Mapping(overrides.clone()))
            .expect("generated overrides must be valid");
        let rendered = compile_options(&default_options, &OptionSource::Mapping(overrides))
            .expect("generated overrides must compile");
        let merged = CopyOptions::parse_rendered(&rendered).expect("compiled options must parse");

        for key in defaults.keys() {
            let expected = override_options.get(key).or_else(|| default_options.get(key));
            prop_assert_eq!(merged.get(key), expected);
        }
    }

    #[test]
    fn json_text_and_mapping_agree(map in option_map()) {
        let text = serde_json::to_string(&map).expect("map serializes");
        let from_text = CopyOptions::from_source(&OptionSource::JsonText(text))
            .expect("json text must normalize");
        let from_map = CopyOptions::from_source(&OptionSource::Mapping(map))
            .expect("mapping must normalize");
        prop_assert_eq!(from_text, from_map);
    }

    #[test]
    fn template_period_is_zero_padded(year in 0_i32..=9999, month in 1_u32..=12) {
        let period = LoadPeriod::new(year, month).expect("period in range");
        let rendered = render_template("data/{year}/{month}", period).expect("known placeholders");
        prop_assert_eq!(rendered, format!("data/{year:04}/{month:02}"));
    }

    #[test]
    fn unknown_placeholders_are_reported(name in "[a-z]{1,8}") {
        prop_assume!(name != "year" && name != "month");
        let period = LoadPeriod::new(2024, 3).expect("period in range");
        let unknown = render_template(&format!("data/{{{name}}}/{{year}}"), period)
            .expect_err("unknown placeholder must fail");
        prop_assert_eq!(unknown, vec![format!("{{{name}}}")]);
    }
}
