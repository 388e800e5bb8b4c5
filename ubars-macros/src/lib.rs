use proc_macro::TokenStream;

mod assets;

/// Embeds template files matching a glob (relative to the calling crate's
/// `Cargo.toml`) as a `&[(&str, &str)]` of `(name, source)` pairs.
///
/// The name is the file stem: `templates/partials/header.hbs` becomes
/// `header`. Feed the result to `Registry::register_partial_assets`.
#[proc_macro]
pub fn partial_assets(input: TokenStream) -> TokenStream {
    assets::partial_assets_impl(input)
}
