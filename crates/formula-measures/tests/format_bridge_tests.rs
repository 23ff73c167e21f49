//! The three surface syntaxes of a calculation property (script clause, XML element, JSON
//! object) must all decode to what was encoded.

use formula_measures::format::json::{read_measure_properties, write_measure_properties};
use formula_measures::format::xml::{
    format_fragment, parse_format_fragment, read_calculation_property,
    write_calculation_property, XmlCalculationProperty,
};
use formula_measures::parser::parse_script;
use formula_measures::{CalculationProperty, CustomFormat, Format, Kpi, KpiAnnotations};
use proptest::prelude::*;
use quick_xml::Writer;
use serde_json::Map;

const CUSTOM_ATTRIBUTES: [&str; 7] = [
    "LCID",
    "Symbol",
    "DisplayName",
    "PositivePattern",
    "NegativePattern",
    "Group",
    "FormatString",
];

fn custom_format() -> impl Strategy<Value = Option<CustomFormat>> {
    prop::option::of(prop::collection::btree_map(
        prop::sample::select(CUSTOM_ATTRIBUTES.to_vec()),
        "[ -~\t\r\n]{0,12}",
        1..4,
    ))
    .prop_map(|attrs| {
        attrs.map(|attrs| {
            attrs
                .into_iter()
                .fold(CustomFormat::new(), |custom, (name, value)| custom.with(name, value))
        })
    })
}

fn format() -> impl Strategy<Value = Format> {
    let accuracy = prop::option::of(0u32..10);
    prop_oneof![
        Just(Format::General),
        (accuracy.clone(), any::<bool>()).prop_map(|(accuracy, thousand_separator)| {
            Format::NumberDecimal {
                accuracy,
                thousand_separator,
            }
        }),
        (accuracy.clone(), any::<bool>()).prop_map(|(accuracy, thousand_separator)| {
            Format::NumberWhole {
                accuracy,
                thousand_separator,
            }
        }),
        accuracy
            .clone()
            .prop_map(|accuracy| Format::Percentage { accuracy }),
        accuracy
            .clone()
            .prop_map(|accuracy| Format::Scientific { accuracy }),
        (accuracy, custom_format())
            .prop_map(|(accuracy, currency)| Format::Currency { accuracy, currency }),
        custom_format().prop_map(|date_time| Format::DateTimeCustom { date_time }),
        Just(Format::DateTimeShortDatePattern),
        Just(Format::DateTimeGeneral),
        Just(Format::Text),
    ]
}

fn text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ -~]{1,12}")
}

fn multiline_text() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[ -~\r\n]{1,16}")
}

fn annotations() -> impl Strategy<Value = KpiAnnotations> {
    prop::collection::btree_map("Kpi[A-Za-z]{1,6}", "[ -~]{0,10}", 0..3).prop_map(|entries| {
        let mut annotations = KpiAnnotations::new();
        for (name, value) in entries {
            annotations.insert(name, value);
        }
        annotations
    })
}

fn kpi() -> impl Strategy<Value = Option<Kpi>> {
    prop::option::of(
        (
            (text(), text(), text(), multiline_text()),
            (text(), text(), multiline_text()),
            (text(), text(), multiline_text()),
            annotations(),
        )
            .prop_map(
                |(
                    (description, target_description, target_format_string, target_expression),
                    (status_graphic, status_description, status_expression),
                    (trend_graphic, trend_description, trend_expression),
                    annotations,
                )| Kpi {
                    description,
                    target_description,
                    target_format_string,
                    target_expression,
                    status_graphic,
                    status_description,
                    status_expression,
                    trend_graphic,
                    trend_description,
                    trend_expression,
                    annotations,
                },
            ),
    )
}

fn property_with(
    kpi: impl Strategy<Value = Option<Kpi>>,
) -> impl Strategy<Value = CalculationProperty> {
    (
        format(),
        text(),
        any::<bool>(),
        text(),
        multiline_text(),
        kpi,
    )
        .prop_map(
            |(format, format_string, is_hidden, display_folder, description, kpi)| {
                CalculationProperty {
                    format,
                    format_string,
                    is_hidden,
                    display_folder,
                    description,
                    kpi,
                }
                .normalized()
            },
        )
}

fn property() -> impl Strategy<Value = CalculationProperty> {
    property_with(kpi())
}

fn property_without_kpi() -> impl Strategy<Value = CalculationProperty> {
    property_with(Just(None))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn format_fragment_round_trips(format in format(), reset_namespace in any::<bool>()) {
        let xml = format_fragment(&format, reset_namespace).unwrap();
        prop_assert_eq!(parse_format_fragment(&xml).unwrap(), format);
    }

    #[test]
    fn script_clause_round_trips(property in property()) {
        let src = match property.to_dax_text() {
            Some(clause) => format!("CREATE MEASURE 'T'[M] = 1\n{clause};"),
            None => "CREATE MEASURE 'T'[M] = 1;".to_string(),
        };
        let parsed = parse_script(&src).unwrap();
        prop_assert_eq!(parsed.measures.len(), 1);
        prop_assert_eq!(parsed.measures[0].calculation_property(), &property);
    }

    #[test]
    fn json_properties_round_trip(property in property()) {
        let mut object = Map::new();
        write_measure_properties(&property, &mut object).unwrap();
        prop_assert_eq!(read_measure_properties(&object).unwrap(), property);
    }

    #[test]
    fn xml_calculation_property_round_trips(
        property in property_without_kpi(),
        annotations in annotations(),
    ) {
        let element = XmlCalculationProperty {
            reference: "[M]".to_string(),
            property,
            annotations,
            format_annotation: true,
        };
        let mut writer = Writer::new(Vec::new());
        write_calculation_property(&mut writer, &element).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        prop_assert_eq!(read_calculation_property(doc.root_element()).unwrap(), element);
    }

    #[test]
    fn every_surface_agrees(property in property_without_kpi()) {
        let mut object = Map::new();
        write_measure_properties(&property, &mut object).unwrap();
        let from_json = read_measure_properties(&object).unwrap();

        let src = match from_json.to_dax_text() {
            Some(clause) => format!("CREATE MEASURE 'T'[M] = 1 {clause}"),
            None => "CREATE MEASURE 'T'[M] = 1".to_string(),
        };
        let from_script = parse_script(&src).unwrap().measures[0]
            .calculation_property()
            .clone();
        prop_assert_eq!(from_script, property);
    }
}
