//! Message formatting helpers.

use spellbridge_runtime::{Attributes, DynamicValue};

const MAX_PRECISION: usize = 64;

/// Expand printf-style verbs in `format` with `args`.
///
/// Supported verbs: `%s`, `%v`, `%d`, `%f` (with optional `.N` precision),
/// `%q`, `%t` and `%%`. A verb without a matching argument renders as
/// `%!<verb>(MISSING)`; surplus arguments are ignored.
pub fn sprintf(format: &str, args: &[DynamicValue]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = digits.parse::<usize>().ok().map(|p| p.min(MAX_PRECISION));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(arg) = args.next() else {
            out.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        match verb {
            'd' => match arg.as_f64() {
                Some(n) => out.push_str(&format!("{}", n.trunc() as i64)),
                None => out.push_str(&format!("%!d({arg})")),
            },
            'f' => match arg.as_f64() {
                Some(n) => out.push_str(&format!("{:.*}", precision.unwrap_or(6), n)),
                None => out.push_str(&format!("%!f({arg})")),
            },
            'q' => match arg.as_str() {
                Some(s) => out.push_str(&format!("{s:?}")),
                None => out.push_str(&format!("{:?}", arg.to_string())),
            },
            't' => match arg.as_bool() {
                Some(b) => out.push_str(if b { "true" } else { "false" }),
                None => out.push_str(&format!("%!t({arg})")),
            },
            's' | 'v' => out.push_str(&arg.to_string()),
            other => out.push_str(&format!("%!{other}({arg})")),
        }
    }
    out
}

/// Replace `{key}` placeholders with attribute values.
///
/// Placeholders without a matching attribute are left as written.
pub fn fill_template(template: &str, attributes: &Attributes) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match attributes.get(key) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
