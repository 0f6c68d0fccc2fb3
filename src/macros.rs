#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Declare a [`RuleDef`](crate::RuleDef) inline.
///
/// ```
/// let def = recascade::rule! {
///     pattern: r"\bpizza\b",
///     to: "FOOD",
///     label: "pizza",
///     tags: ["Mangiare"],
///     options: recascade::RuleOptions::EXIT_ON_MATCH,
/// };
/// assert_eq!(def.category_tags, ["Mangiare"]);
/// ```
#[macro_export]
macro_rules! rule {
    (
        pattern: $pattern:expr,
        to: $to:expr
        $(, label: $label:expr)?
        $(, tags: [ $($tag:expr),* $(,)? ])?
        $(, options: $options:expr)?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut def = $crate::RuleDef::new($pattern, $to, $crate::RuleOptions::default());
        $( def.label = ::std::string::String::from($label); )?
        $( $( def.add_tag($tag); )* )?
        $( def.options = $options; )?
        def
    }};
}
