/// Decode a single type descriptor token into a readable type name.
///
/// Unknown or truncated input is echoed back rather than rejected, so one odd
/// signature never stops a scan.
pub(crate) fn decode_type(descriptor: &str) -> String {
    let mut chars = descriptor.chars();
    if let (Some(code), None) = (chars.next(), chars.next()) {
        return primitive_name(code)
            .map(str::to_string)
            .unwrap_or_else(|| descriptor.to_string());
    }
    if let Some(component) = descriptor.strip_prefix('[') {
        return format!("{}[]", decode_type(component));
    }
    let body = descriptor.strip_prefix('L').unwrap_or(descriptor);
    let end = body.find(';').unwrap_or(body.len());
    body[..end].replace('/', ".")
}

/// Render a field reference as `<type> <name>`.
pub(crate) fn decode_field_signature(name: &str, descriptor: &str) -> String {
    format!("{} {}", decode_type(descriptor), name)
}

/// Render a method reference as `<return> <name>(<params>)`.
pub(crate) fn decode_method_signature(name: &str, descriptor: &str) -> String {
    let (params, return_type) = split_method_descriptor(descriptor);
    format!(
        "{} {}({})",
        decode_type(return_type),
        name,
        decode_parameters(params).join(", ")
    )
}

/// Render a caller method as `<name>(<params>)`, without the return type.
pub(crate) fn decode_caller_signature(name: &str, descriptor: &str) -> String {
    let (params, _) = split_method_descriptor(descriptor);
    format!("{}({})", name, decode_parameters(params).join(", "))
}

fn primitive_name(code: char) -> Option<&'static str> {
    let name = match code {
        'B' => "byte",
        'S' => "short",
        'Z' => "boolean",
        'C' => "char",
        'I' => "int",
        'J' => "long",
        'F' => "float",
        'D' => "double",
        'V' => "void",
        _ => return None,
    };
    Some(name)
}

/// Split `(<params>)<return>` into its parameter block and return token.
///
/// Without a `)` the whole descriptor is treated as the return token.
fn split_method_descriptor(descriptor: &str) -> (&str, &str) {
    match descriptor.find(')') {
        Some(close) => {
            let params = &descriptor[..close];
            let params = params.strip_prefix('(').unwrap_or(params);
            (params, &descriptor[close + 1..])
        }
        None => ("", descriptor),
    }
}

fn decode_parameters(params: &str) -> Vec<String> {
    let mut decoded = Vec::new();
    for fragment in params.split(';') {
        if fragment.starts_with('L') {
            decoded.push(decode_type(fragment));
            continue;
        }
        let mut index = 0;
        while index < fragment.len() {
            let rest = &fragment[index..];
            let dims = rest.len() - rest.trim_start_matches('[').len();
            let Some(code) = rest[dims..].chars().next() else {
                // Dangling array prefix at the end of a truncated block.
                decoded.push(decode_type(rest));
                break;
            };
            if code == 'L' {
                decoded.push(decode_type(rest));
                break;
            }
            let token_len = dims + code.len_utf8();
            decoded.push(decode_type(&rest[..token_len]));
            index += token_len;
        }
    }
    decoded
}
