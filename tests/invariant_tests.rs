//! Quantified invariants and boundary behaviours of the pipeline:
//! round-trips, identity transforms, determinism, operator laws.

use utlx::{parse_format, serialise_format, transform, Format, FormatOptions};

fn identity_script(format: &str) -> String {
    format!("%utlx 1.0\ninput {}\noutput {}\n---\n$input\n", format, format)
}

fn run(script: &str, inputs: &[(&str, &[u8])]) -> Vec<u8> {
    transform(script, inputs).expect("transform failure")
}

#[test]
fn json_identity_transform() {
    let doc = br#"{"a":1,"b":[true,null,"x"],"c":{"nested":{"deep":2.5}},"d":[],"e":{}}"#;
    assert_eq!(run(&identity_script("json"), &[("input", doc)]), doc.to_vec());
}

#[test]
fn xml_identity_transform() {
    let doc = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
               <Order id=\"1\" state=\"open\"><Name>A</Name><Line>x</Line><Line>y</Line></Order>";
    assert_eq!(
        run(&identity_script("xml"), &[("input", doc.as_bytes())]),
        doc.as_bytes().to_vec()
    );
}

#[test]
fn csv_identity_transform() {
    let doc = b"id,name\n1,Ada\n2,\"Bo,b\"\n";
    assert_eq!(run(&identity_script("csv"), &[("input", doc)]), doc.to_vec());
}

#[test]
fn yaml_identity_is_structural() {
    let doc = b"a: 1\nb:\n- x\n- y\n";
    let once = run(&identity_script("yaml"), &[("input", doc)]);
    let twice = run(&identity_script("yaml"), &[("input", &once)]);
    assert_eq!(once, twice);
}

#[test]
fn transform_is_deterministic() {
    let script = "%utlx 1.0\ninput json\noutput json\n---\n\
                  { k: $input.xs |> sortBy(x => x.n) |> map(x => x.n), g: groupBy($input.xs, x => x.n % 2) }";
    let doc = br#"{"xs":[{"n":3},{"n":1},{"n":2}]}"#;
    let a = run(script, &[("input", doc)]);
    let b = run(script, &[("input", doc)]);
    assert_eq!(a, b);
}

#[test]
fn pipe_equivalence() {
    let doc = br#"{"xs":[1,2,3]}"#;
    let piped = run(
        "%utlx 1.0\ninput json\noutput json\n---\n$input.xs |> take(2)",
        &[("input", doc)],
    );
    let called = run(
        "%utlx 1.0\ninput json\noutput json\n---\ntake($input.xs, 2)",
        &[("input", doc)],
    );
    assert_eq!(piped, called);
}

#[test]
fn spread_laws_end_to_end() {
    let doc = br#"{"k":"v"}"#;
    assert_eq!(
        run(
            "%utlx 1.0\ninput json\noutput json\n---\n{ ...{}, k: \"v\" }",
            &[("input", doc)]
        ),
        doc.to_vec()
    );
    assert_eq!(
        run(
            "%utlx 1.0\ninput json\noutput json\n---\n{ ...$input, ...$input }",
            &[("input", doc)]
        ),
        doc.to_vec()
    );
    assert_eq!(
        run(
            "%utlx 1.0\ninput json\noutput json\n---\n[ ...[], 1 ]",
            &[("input", doc)]
        ),
        b"[1]".to_vec()
    );
}

#[test]
fn null_propagation_laws() {
    let doc = br#"{"x":null}"#;
    let out = run(
        "%utlx 1.0\ninput json\noutput json\n---\n\
         { a: $input.x?.anything, b: $input.x ?? \"fb\", c: \"kept\" ?? \"fb\" }",
        &[("input", doc)],
    );
    assert_eq!(out, br#"{"a":null,"b":"fb","c":"kept"}"#.to_vec());
}

#[test]
fn xsd_schema_type_and_root_unwrap() {
    let xsd = br#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="po" type="POType"/>
</xs:schema>"#;
    let script = "%utlx 1.0\ninput xsd\noutput json\n---\n\
                  { kind: $input.__metadata.__schemaType, decl: $input[\"xs:element\"].@name }";
    let out = run(script, &[("input", xsd)]);
    assert_eq!(out, br#"{"kind":"xsd","decl":"po"}"#.to_vec());
}

#[test]
fn jsch_schema_type_is_recorded() {
    let schema = br#"{"type":"object","properties":{"id":{"type":"string"}}}"#;
    let script = "%utlx 1.0\ninput jsch\noutput json\n---\n\
                  { kind: $input.__metadata.__schemaType, root: $input.type }";
    assert_eq!(
        run(script, &[("input", schema)]),
        br#"{"kind":"jsch","root":"object"}"#.to_vec()
    );
}

#[test]
fn empty_containers_round_trip() {
    for doc in [&b"{}"[..], &b"[]"[..], &br#"{"a":[]}"#[..], &br#"{"a":{}}"#[..]] {
        assert_eq!(run(&identity_script("json"), &[("input", doc)]), doc.to_vec());
    }
}

#[test]
fn int_float_boundary_at_2_pow_53() {
    let doc = br#"{"exact":9007199254740992,"above":9007199254740993,"f":9007199254740992.0}"#;
    let value = parse_format(doc, Format::Json, &FormatOptions::default()).unwrap();
    let map = value.as_object().unwrap();
    // both stay exact as 64-bit integers
    assert_eq!(map["exact"].as_int(), Some(9007199254740992));
    assert_eq!(map["above"].as_int(), Some(9007199254740993));
    assert!(map["f"].as_int().is_none());
    let out = serialise_format(&value, Format::Json, &FormatOptions::default()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("9007199254740993"));
}

#[test]
fn unicode_and_bom_prefixed_inputs() {
    let script = identity_script("json");
    let doc = "\u{FEFF}{\"greeting\":\"héllo wörld ✓\"}".as_bytes().to_vec();
    let out = run(&script, &[("input", &doc)]);
    assert_eq!(out, "{\"greeting\":\"héllo wörld ✓\"}".as_bytes().to_vec());

    let yaml = "\u{FEFF}key: välue\n".as_bytes().to_vec();
    let out = run(&identity_script("yaml"), &[("input", &yaml)]);
    assert!(String::from_utf8(out).unwrap().contains("välue"));
}

#[test]
fn deeply_nested_structures_within_bound() {
    let mut doc = String::new();
    let depth = 200;
    for _ in 0..depth {
        doc.push_str("{\"n\":");
    }
    doc.push('1');
    for _ in 0..depth {
        doc.push('}');
    }
    let out = run(&identity_script("json"), &[("input", doc.as_bytes())]);
    assert_eq!(out, doc.as_bytes().to_vec());
}

#[test]
fn xml_repeated_elements_auto_array() {
    let doc = b"<Items><Item>1</Item><Item>2</Item><Item>3</Item></Items>";
    let script = "%utlx 1.0\ninput xml\noutput json\n---\n$input.Items.Item";
    assert_eq!(
        run(script, &[("input", doc)]),
        br#"["1","2","3"]"#.to_vec()
    );
}

#[test]
fn csv_quoted_fields_survive_the_pipeline() {
    let doc = b"a,b\n\"x,y\",\"l1\nl2\"\n";
    let script = "%utlx 1.0\ninput csv\noutput json\n---\n$input[0]";
    assert_eq!(
        run(script, &[("input", doc)]),
        br#"{"a":"x,y","b":"l1\nl2"}"#.to_vec()
    );
}

#[test]
fn duplicate_json_keys_keep_last_value() {
    let value = parse_format(
        br#"{"a":1,"a":2}"#,
        Format::Json,
        &FormatOptions::default(),
    )
    .unwrap();
    assert_eq!(value.as_object().unwrap()["a"].as_int(), Some(2));
}
