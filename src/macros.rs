#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Assign `$value` to `$target.$field` when it differs, recording the column
/// name into `$changes`.
#[macro_export]
macro_rules! assign_changed {
    ($changes:ident, $target:ident . $field:ident, $value:expr) => {{
        let value = $value;
        if $target.$field != value {
            $target.$field = value;
            $changes.push(stringify!($field));
        }
    }};
}
