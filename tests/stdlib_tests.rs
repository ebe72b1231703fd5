//! Standard library coverage through full scripts: each family exercised
//! end-to-end the way a transformation author would call it.

use utlx::transform;

fn eval_json(body: &str, input: &[u8]) -> String {
    let script = format!("%utlx 1.0\ninput json\noutput json\n---\n{}\n", body);
    String::from_utf8(transform(&script, &[("input", input)]).expect("transform failure"))
        .expect("utf8")
}

const NUMBERS: &[u8] = br#"{"xs":[3,1,4,1,5,9,2,6]}"#;

#[test]
fn array_family() {
    assert_eq!(eval_json("$input.xs |> sort() |> take(3)", NUMBERS), "[1,1,2]");
    assert_eq!(eval_json("$input.xs |> distinct() |> count()", NUMBERS), "7");
    assert_eq!(eval_json("$input.xs |> filter(x => x > 4)", NUMBERS), "[5,9,6]");
    assert_eq!(
        eval_json("$input.xs |> reduce((acc, x) => acc + x, 0)", NUMBERS),
        "31"
    );
    assert_eq!(eval_json("$input.xs |> chunk(3) |> first()", NUMBERS), "[3,1,4]");
    assert_eq!(
        eval_json("zip([1, 2], [\"a\", \"b\"])", b"{}"),
        r#"[[1,"a"],[2,"b"]]"#
    );
    assert_eq!(
        eval_json("unzip([[1, \"a\"], [2, \"b\"]])", b"{}"),
        r#"[[1,2],["a","b"]]"#
    );
    assert_eq!(eval_json("union([1, 2], [2, 3])", b"{}"), "[1,2,3]");
    assert_eq!(eval_json("intersect([1, 2, 3], [2, 3, 4])", b"{}"), "[2,3]");
    assert_eq!(eval_json("difference([1, 2, 3], [2])", b"{}"), "[1,3]");
    assert_eq!(eval_json("windowed([1, 2, 3, 4], 2)", b"{}"), "[[1,2],[2,3],[3,4]]");
    assert_eq!(eval_json("flatten([[1, [2]], [3]])", b"{}"), "[1,[2],3]");
    assert_eq!(eval_json("avg([2, 4])", b"{}"), "3.0");
    assert_eq!(eval_json("min($input.xs)", NUMBERS), "1");
    assert_eq!(eval_json("max($input.xs)", NUMBERS), "9");
}

#[test]
fn group_by_preserves_first_seen_key_order() {
    let out = eval_json(
        "groupBy($input.xs, x => if (x % 2 == 0) \"even\" else \"odd\")",
        NUMBERS,
    );
    assert_eq!(out, r#"{"odd":[3,1,1,5,9],"even":[4,2,6]}"#);
}

#[test]
fn string_family() {
    let hello = br#"{"s":"  Hello, World  "}"#;
    assert_eq!(eval_json("$input.s |> trim() |> upper()", hello), r#""HELLO, WORLD""#);
    assert_eq!(eval_json("split(\"a,b,c\", \",\")", b"{}"), r#"["a","b","c"]"#);
    assert_eq!(eval_json("join([1, 2], \"-\")", b"{}"), r#""1-2""#);
    assert_eq!(
        eval_json("replace(\"aaa\", \"a\", \"b\")", b"{}"),
        r#""bbb""#
    );
    assert_eq!(eval_json("substring(\"abcdef\", 1, 3)", b"{}"), r#""bc""#);
    assert_eq!(eval_json("substring(\"abcdef\", -2)", b"{}"), r#""ef""#);
    assert_eq!(eval_json("matches(\"a1b\", \"\\\\d\")", b"{}"), "true");
    assert_eq!(
        eval_json("replaceRegex(\"a1b2\", \"\\\\d\", \"#\")", b"{}"),
        r#""a#b#""#
    );
    assert_eq!(eval_json("padLeft(\"7\", 3, \"0\")", b"{}"), r#""007""#);
    assert_eq!(eval_json("camelCase(\"order line total\")", b"{}"), r#""orderLineTotal""#);
    assert_eq!(eval_json("kebabCase(\"OrderLineTotal\")", b"{}"), r#""order-line-total""#);
    assert_eq!(eval_json("length(\"héllo\")", b"{}"), "5");
}

#[test]
fn object_family() {
    let obj = br#"{"o":{"b":1,"a":2,"c":3}}"#;
    assert_eq!(eval_json("keys($input.o)", obj), r#"["b","a","c"]"#);
    assert_eq!(eval_json("values($input.o)", obj), "[1,2,3]");
    assert_eq!(
        eval_json("$input.o |> entries() |> fromEntries()", obj),
        r#"{"b":1,"a":2,"c":3}"#
    );
    assert_eq!(eval_json("pick($input.o, [\"a\", \"c\"])", obj), r#"{"a":2,"c":3}"#);
    assert_eq!(eval_json("omit($input.o, \"b\")", obj), r#"{"a":2,"c":3}"#);
    assert_eq!(
        eval_json("mapValues($input.o, v => v * 10)", obj),
        r#"{"b":10,"a":20,"c":30}"#
    );
    assert_eq!(
        eval_json("mapEntries($input.o, (k, v) => { key: upper(k), value: v })", obj),
        r#"{"B":1,"A":2,"C":3}"#
    );
    assert_eq!(
        eval_json("filterEntries($input.o, (k, v) => v > 1)", obj),
        r#"{"a":2,"c":3}"#
    );
    assert_eq!(eval_json("containsKey($input.o, \"a\")", obj), "true");
    assert_eq!(
        eval_json("merge({ a: 1 }, { b: 2 }, { a: 3 })", b"{}"),
        r#"{"a":3,"b":2}"#
    );
    assert_eq!(
        eval_json("deepMerge({ a: { x: 1, y: 2 } }, { a: { y: 9 } })", b"{}"),
        r#"{"a":{"x":1,"y":9}}"#
    );
    let nested = br#"{"n":{"a":{"b":[{"c":42}]}}}"#;
    assert_eq!(eval_json("getPath($input.n, \"a.b.0.c\")", nested), "42");
    assert_eq!(eval_json("getPath($input.n, \"a.missing\", \"dflt\")", nested), r#""dflt""#);
    assert_eq!(
        eval_json("setPath({ }, \"a.b\", 1)", b"{}"),
        r#"{"a":{"b":1}}"#
    );
}

#[test]
fn math_family() {
    assert_eq!(eval_json("abs(-3)", b"{}"), "3");
    assert_eq!(eval_json("round(2.5)", b"{}"), "3");
    assert_eq!(eval_json("round(2.346, 2)", b"{}"), "2.35");
    assert_eq!(eval_json("ceil(1.1)", b"{}"), "2");
    assert_eq!(eval_json("floor(1.9)", b"{}"), "1");
    assert_eq!(eval_json("pow(2, 10)", b"{}"), "1024");
    assert_eq!(eval_json("sqrt(9)", b"{}"), "3.0");
    assert_eq!(eval_json("median([1, 3, 2])", b"{}"), "2.0");
    assert_eq!(eval_json("percentile([1, 2, 3, 4], 50)", b"{}"), "2.5");
    assert_eq!(eval_json("variance([2, 2, 2])", b"{}"), "0.0");
}

#[test]
fn type_family() {
    assert_eq!(eval_json("getType(\"x\")", b"{}"), r#""string""#);
    assert_eq!(eval_json("getType(null)", b"{}"), r#""null""#);
    assert_eq!(eval_json("isArray([1])", b"{}"), "true");
    assert_eq!(eval_json("isDefined(null)", b"{}"), "false");
    assert_eq!(eval_json("toString(42)", b"{}"), r#""42""#);
    assert_eq!(eval_json("toNumber(\"3.5\")", b"{}"), "3.5");
    assert_eq!(eval_json("toNumber(\"12\")", b"{}"), "12");
    assert_eq!(eval_json("parseNumber(\"nope\")", b"{}"), "null");
    assert_eq!(eval_json("toBoolean(\"TRUE\")", b"{}"), "true");
}

#[test]
fn datetime_family() {
    assert_eq!(
        eval_json("parseDate(\"2026-03-14\") |> formatDate(\"%d.%m.%Y\")", b"{}"),
        r#""14.03.2026""#
    );
    assert_eq!(
        eval_json("addDays(parseDate(\"2026-02-27\"), 2) |> formatDate(\"%Y-%m-%d\")", b"{}"),
        r#""2026-03-01""#
    );
    assert_eq!(
        eval_json(
            "diffDays(parseDate(\"2026-03-01\"), parseDate(\"2026-02-27\"))",
            b"{}"
        ),
        "2"
    );
    assert_eq!(
        eval_json(
            "isBefore(parseDate(\"2026-01-01\"), parseDate(\"2026-06-01\"))",
            b"{}"
        ),
        "true"
    );
    assert_eq!(
        eval_json(
            "age(parseDate(\"2000-06-15\"), parseDate(\"2026-06-14\"))",
            b"{}"
        ),
        "25"
    );
    assert_eq!(
        eval_json(
            "convertTimezone(parseDate(\"2026-01-01T12:00:00Z\"), \"Europe/Paris\") |> formatDate(\"%H:%M\")",
            b"{}"
        ),
        r#""13:00""#
    );
}

#[test]
fn encoding_family() {
    assert_eq!(eval_json("base64Encode(\"hi\")", b"{}"), r#""aGk=""#);
    assert_eq!(eval_json("base64Decode(\"aGk=\")", b"{}"), r#""hi""#);
    assert_eq!(eval_json("urlEncode(\"a b\")", b"{}"), r#""a%20b""#);
    assert_eq!(eval_json("hexEncode(\"A\")", b"{}"), r#""41""#);
    assert_eq!(eval_json("xmlEscape(\"<&>\")", b"{}"), r#""&lt;&amp;&gt;""#);
}

#[test]
fn crypto_family() {
    assert_eq!(
        eval_json("sha256(\"abc\")", b"{}"),
        r#""ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad""#
    );
    assert_eq!(
        eval_json("md5(\"abc\")", b"{}"),
        r#""900150983cd24fb0d6963f7d28e17f72""#
    );
    assert_eq!(eval_json("secureCompare(\"x\", \"x\")", b"{}"), "true");
    assert_eq!(
        eval_json(
            "decryptAes(encryptAes(\"msg\", \"0123456789abcdef\", \"0123456789abcdef\"), \"0123456789abcdef\", \"0123456789abcdef\")",
            b"{}"
        ),
        r#""msg""#
    );
}

#[test]
fn compression_family() {
    assert_eq!(
        eval_json("gunzip(gzip(\"payload payload\"))", b"{}"),
        r#""payload payload""#
    );
    assert_eq!(
        eval_json("inflate(deflate(\"zzz\"))", b"{}"),
        r#""zzz""#
    );
    assert_eq!(
        eval_json(
            "unzipArchive(zipArchive({ \"a.txt\": \"one\", \"b.txt\": \"two\" }))",
            b"{}"
        ),
        r#"{"a.txt":"one","b.txt":"two"}"#
    );
}

#[test]
fn xml_and_regional_and_jwt_families() {
    assert_eq!(eval_json("localName(\"po:Id\")", b"{}"), r#""Id""#);
    assert_eq!(
        eval_json("qualifiedName(\"po\", \"Id\")", b"{}"),
        r#""po:Id""#
    );
    assert_eq!(
        eval_json("parseRegionalNumber(\"1.234,56\", \"eu\")", b"{}"),
        "1234.56"
    );
    assert_eq!(
        eval_json("formatRegionalNumber(1234.5, \"swiss\")", b"{}"),
        r#""1'234.50""#
    );
    let payload = eval_json(
        "decodeJwt(\"eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJhZGEifQ.c2ln\").payload.sub",
        b"{}",
    );
    assert_eq!(payload, r#""ada""#);
}

#[test]
fn error_shapes_are_function_specific() {
    let script = "%utlx 1.0\ninput json\noutput json\n---\nupper(42)\n";
    let err = transform(script, &[("input", b"{}")]).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("upper"), "message was: {}", text);
    assert!(text.contains("string"), "message was: {}", text);
}
