use serde::Serialize;
use ubars::tpl::whitespace::normalize;
use ubars::{
    CompileOptions, Template, TemplateError, Value, parse, parse_with, print_ast, render,
};

fn obj(pairs: &[(&str, Value)]) -> Value {
    Value::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

fn render_str(source: &str, data: &Value) -> String {
    let program = parse(source).expect("template should parse");
    render(&program, data, None).expect("template should render")
}

#[test]
fn test_content_passes_through() {
    for source in [
        "",
        "hello world",
        "line one\n  line two\n",
        "  \n\t\n",
        "<p>a & b</p>",
        "{ not a tag }",
    ] {
        assert_eq!(render_str(source, &Value::Null), source);
        assert_eq!(render_str(source, &obj(&[("x", Value::from(1))])), source);
    }
}

#[test]
fn test_simple_substitution() {
    assert_eq!(render_str("{{foo}}", &obj(&[("foo", "foo".into())])), "foo");
    assert_eq!(render_str("{{missing}}", &obj(&[])), "");
}

#[test]
fn test_escaped_delimiter() {
    assert_eq!(render_str("\\{{foo}}", &obj(&[("foo", "food".into())])), "{{foo}}");
}

#[test]
fn test_tilde_strip_and_escape() {
    assert_eq!(
        render_str(" {{~foo~}} ", &obj(&[("foo", "bar<".into())])),
        "bar&lt;"
    );
    let data = obj(&[("foo", "<b>".into())]);
    assert_eq!(render_str(" {{~{foo}~}} |", &data), "<b>|");
    assert_eq!(render_str(" {{~{foo~}}} |", &data), "<b>|");
    assert_eq!(render_str("a {{{foo}~}} b", &data), "a <b>b");
}

#[test]
fn test_if_false_renders_nothing() {
    let data = obj(&[("goodbye", false.into()), ("world", "world".into())]);
    assert_eq!(
        render_str("{{#if goodbye}}GOODBYE {{/if}}cruel {{world}}!", &data),
        "cruel world!"
    );
}

#[test]
fn test_each_with_index() {
    let data = obj(&[("items", Value::from(vec!["a", "b"]))]);
    assert_eq!(
        render_str("{{#each items}}{{@index}}:{{this}} {{/each}}", &data),
        "0:a 1:b "
    );
}

#[test]
fn test_mismatched_blocks_fail() {
    for (open, close) in [("a", "b"), ("if", "each"), ("foo", "foo2"), ("x", "X")] {
        let source = format!("{{{{#{}}}}}body{{{{/{}}}}}", open, close);
        match parse(&source) {
            Err(TemplateError::MismatchedBlock { open: o, close: c, .. }) => {
                assert_eq!(o, open);
                assert_eq!(c, close);
            }
            other => panic!("{} should not parse, got {:?}", source, other),
        }
    }
    assert!(matches!(
        parse("{{{{raw}}}}x{{{{/other}}}}"),
        Err(TemplateError::MismatchedBlock { .. })
    ));
}

#[test]
fn test_parse_errors_carry_position() {
    let err = parse("a\n{{#if x}}\n{{/each}}").unwrap_err();
    assert_eq!(err.position().1, 3);

    let err = parse("ok\n{{foo ; bar}}").unwrap_err();
    assert!(matches!(err, TemplateError::Lex { line: 2, .. }));

    let err = parse("{{foo").unwrap_err();
    assert!(err.to_string().contains("line 1"));
}

#[test]
fn test_out_of_depth_paths_are_empty() {
    let data = obj(&[
        ("foo", "x".into()),
        ("xs", Value::from(vec![1, 2])),
    ]);
    assert_eq!(render_str("{{../foo}}|{{../../foo}}", &data), "|");
    assert_eq!(
        render_str("{{#each xs}}[{{../../foo}}{{../foo}}]{{/each}}", &data),
        "[x][x]"
    );
}

#[test]
fn test_else_chain() {
    let source = "{{#if a}}A{{else if b}}B{{else}}C{{/if}}";
    let cases = [(true, false, "A"), (false, true, "B"), (false, false, "C")];
    for (a, b, expected) in cases {
        let data = obj(&[("a", a.into()), ("b", b.into())]);
        assert_eq!(render_str(source, &data), expected);
    }
}

#[test]
fn test_unless_and_inverted_section() {
    let source = "{{#unless a}}no{{else}}yes{{/unless}}";
    assert_eq!(render_str(source, &obj(&[("a", false.into())])), "no");
    assert_eq!(render_str(source, &obj(&[("a", "x".into())])), "yes");

    let source = "{{^items}}empty{{/items}}";
    assert_eq!(
        render_str(source, &obj(&[("items", Value::List(vec![]))])),
        "empty"
    );
    assert_eq!(render_str(source, &obj(&[("items", Value::from(vec![1]))])), "");
}

#[test]
fn test_sections() {
    let data = obj(&[
        ("site", "s".into()),
        ("person", obj(&[("name", "ann".into())])),
        ("flag", true.into()),
        ("label", "on".into()),
        ("items", Value::from(vec![1, 2])),
    ]);
    assert_eq!(
        render_str("{{#person}}{{name}} ({{../site}}){{/person}}", &data),
        "ann (s)"
    );
    assert_eq!(render_str("{{#flag}}{{label}}{{/flag}}", &data), "on");
    assert_eq!(render_str("{{#items}}<{{this}}>{{/items}}", &data), "<1><2>");
    assert_eq!(
        render_str("{{#nobody}}x{{else}}{{site}}{{/nobody}}", &data),
        "s"
    );
}

#[test]
fn test_each_variants() {
    let data = obj(&[
        ("m", obj(&[("a", 1.into()), ("b", 2.into())])),
        (
            "people",
            Value::from(vec![
                obj(&[("name", "a".into())]),
                obj(&[("name", "b".into())]),
            ]),
        ),
        ("xs", Value::from(vec!["a", "b"])),
        ("empty", Value::List(vec![])),
        ("sep", "-".into()),
        ("title", "t".into()),
        (
            "rows",
            Value::from(vec![Value::from(vec!["a", "b"]), Value::from(vec!["c"])]),
        ),
    ]);

    assert_eq!(
        render_str(
            "{{#each m}}{{@key}}={{this}}{{#unless @last}},{{/unless}}{{/each}}",
            &data
        ),
        "a=1,b=2"
    );
    assert_eq!(
        render_str("{{#each people as |p i|}}{{i}}:{{p.name}} {{/each}}", &data),
        "0:a 1:b "
    );
    assert_eq!(
        render_str("{{#each xs}}{{#if @first}}[{{/if}}{{this}}{{/each}}", &data),
        "[ab"
    );
    assert_eq!(
        render_str("{{#each empty}}x{{else}}none{{/each}}", &data),
        "none"
    );
    assert_eq!(
        render_str("{{#each xs}}{{../sep}}{{this}}{{/each}}", &data),
        "-a-b"
    );
    assert_eq!(
        render_str("{{#each xs}}{{@root.title}}{{/each}}", &data),
        "tt"
    );
    assert_eq!(
        render_str(
            "{{#each rows}}{{#each this}}{{@../index}}.{{@index}} {{/each}}{{/each}}",
            &data
        ),
        "0.0 0.1 1.0 "
    );
}

#[test]
fn test_with() {
    let data = obj(&[("person", obj(&[("name", "ann".into())]))]);
    assert_eq!(render_str("{{#with person}}{{name}}{{/with}}", &data), "ann");
    assert_eq!(
        render_str("{{#with person as |p|}}{{p.name}}/{{name}}{{/with}}", &data),
        "ann/ann"
    );
    assert_eq!(
        render_str("{{#with missing}}x{{else}}none{{/with}}", &data),
        "none"
    );

    let zero = obj(&[("n", 0.into())]);
    assert_eq!(
        render_str("{{#with n}}prog{{else}}inv{{/with}}", &zero),
        "inv"
    );
    assert_eq!(
        render_str("{{#with n includeZero=true}}[{{this}}]{{else}}inv{{/with}}", &zero),
        "[0]"
    );
}

#[test]
fn test_unescaped_output() {
    let data = obj(&[("html", "<b>".into()), ("safe", Value::safe("<i>"))]);
    assert_eq!(
        render_str("{{{html}}}|{{&html}}|{{html}}|{{safe}}", &data),
        "<b>|<b>|&lt;b&gt;|<i>"
    );
}

#[test]
fn test_lookup_and_equal() {
    let data = obj(&[
        ("names", Value::from(vec!["a", "b"])),
        ("user", obj(&[("name", "ann".into())])),
        ("field", "name".into()),
        ("one", 1.into()),
        ("one_f", 1.0.into()),
        ("s", "x".into()),
        ("n", 2.into()),
    ]);
    assert_eq!(render_str("{{lookup names 1}}", &data), "b");
    assert_eq!(render_str("{{lookup user field}}", &data), "ann");
    assert_eq!(render_str("{{equal one one_f}}", &data), "true");
    assert_eq!(render_str("{{equal one s}}", &data), "false");
    assert_eq!(
        render_str("{{#equal s \"x\"}}yes{{else}}no{{/equal}}", &data),
        "yes"
    );
    assert_eq!(render_str("{{#if (equal n 2)}}two{{/if}}", &data), "two");
}

#[test]
fn test_include_zero() {
    let data = obj(&[("n", 0.into())]);
    assert_eq!(
        render_str("{{#if n}}a{{/if}}{{#if n includeZero=true}}b{{/if}}", &data),
        "b"
    );
}

#[test]
fn test_comments_and_standalone_lines() {
    assert_eq!(render_str("a{{! note }}b", &Value::Null), "ab");
    assert_eq!(
        render_str("a\n  {{!-- long comment --}}\nb", &Value::Null),
        "a\nb"
    );

    let data = obj(&[("xs", Value::from(vec!["a", "b"]))]);
    assert_eq!(
        render_str(
            "<ul>\n{{#each xs}}\n  <li>{{this}}</li>\n{{/each}}\n</ul>\n",
            &data
        ),
        "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n"
    );
}

#[test]
fn test_ignore_standalone() {
    let options = CompileOptions::new().ignore_standalone(true);
    let program = parse_with("{{#if a}}\nyes\n{{/if}}\n", &options).unwrap();
    let out = render(&program, &obj(&[("a", true.into())]), None).unwrap();
    assert_eq!(out, "\nyes\n\n");
}

#[test]
fn test_whitespace_pass_is_idempotent() {
    let sources = [
        "<ul>\n{{#each xs}}\n  <li>{{this}}</li>\n{{/each}}\n</ul>\n",
        "  {{~#if a~}}  x  {{~else~}}  y  {{~/if~}}  ",
        "a\n  {{> p}}\nb\n  {{! c }}\n",
        "{{#a}}\n{{else b}}\n{{else}}\n{{/a}}\n",
    ];
    for source in sources {
        let once = parse(source).unwrap();
        let mut twice = once.clone();
        normalize(&mut twice, &CompileOptions::default());
        assert_eq!(once, twice, "{}", source);
    }
}

#[test]
fn test_path_forms() {
    let data = obj(&[
        ("first name", "Ann".into()),
        ("firstName", "Bea".into()),
        ("user", obj(&[("tags", Value::from(vec!["x", "y"]))])),
        ("items", Value::from(vec!["p", "q"])),
    ]);
    assert_eq!(render_str("{{[first name]}}", &data), "Ann");
    assert_eq!(render_str("{{first_name}}", &data), "Bea");
    assert_eq!(render_str("{{user.tags.length}}", &data), "2");
    assert_eq!(render_str("{{items.[1]}}|{{items/[0]}}", &data), "q|p");
    assert_eq!(render_str("{{items.0}}|{{items/1}}|{{items.2}}", &data), "p|q|");
    assert_eq!(render_str("{{user.tags.1.length}}", &data), "1");
    assert_eq!(render_str("{{this.items.[0]}}", &data), "p");
}

#[test]
fn test_value_display() {
    let data = obj(&[
        ("a", 1.5.into()),
        ("b", 2.0.into()),
        ("c", (-3).into()),
        ("d", Value::from(vec![1, 2])),
        ("e", obj(&[("k", 1.into())])),
        ("f", Value::Null),
    ]);
    assert_eq!(render_str("{{a}} {{b}} {{c}} {{d}} [{{e}}] [{{f}}]", &data), "1.5 2 -3 12 [] []");
}

#[derive(Serialize)]
struct Customer {
    name: String,
}

#[derive(Serialize)]
struct Item {
    name: String,
    qty: u32,
}

#[derive(Serialize)]
struct Order {
    id: u32,
    customer: Customer,
    items: Vec<Item>,
    note: Option<String>,
}

#[test]
fn test_render_serde_struct() {
    let template = Template::compile(
        "Order #{{id}} for {{customer.name}}\n{{#each items}}\n- {{name}} x{{qty}}\n{{/each}}\n{{#if note}}Note: {{note}}\n{{/if}}",
    )
    .unwrap();
    let mut order = Order {
        id: 7,
        customer: Customer {
            name: "Ann".to_string(),
        },
        items: vec![
            Item {
                name: "pen".to_string(),
                qty: 2,
            },
            Item {
                name: "ink".to_string(),
                qty: 1,
            },
        ],
        note: None,
    };
    assert_eq!(
        template.render(&order).unwrap(),
        "Order #7 for Ann\n- pen x2\n- ink x1\n"
    );

    order.note = Some("rush".to_string());
    assert_eq!(
        template.render(&order).unwrap(),
        "Order #7 for Ann\n- pen x2\n- ink x1\nNote: rush\n"
    );
}

#[test]
fn test_print_ast_is_diagnostic() {
    let program = parse("{{#if a}}yes{{/if}}").unwrap();
    let printed = print_ast(&program);
    assert!(printed.starts_with("BLOCK:\n  PATH:if [PATH:a]\n"));
    assert!(printed.contains("CONTENT[ 'yes' ]"));
}
