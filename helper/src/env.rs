/// Declare a constant holding the name of an environment variable, so the
/// name is written once and reused by [`env_load!`].
#[macro_export]
macro_rules! env_var {
    ($name:ident) => {
        const $name: &'static str = stringify!($name);
    };
}

/// Load an environment variable into a validated newtype (anything exposing
/// `try_new`, e.g. a `nutype`).
///
/// - `env_load!(Type, VAR)`: the raw string is handed to `Type::try_new`.
/// - `env_load!(Type, VAR, Raw)`: the string is parsed into `Raw` first.
/// - `env_load!(Type, VAR, Raw, default)`: same, `default` is used when the
///   variable is not set.
///
/// The caller needs `anyhow::Context` in scope and must return an
/// `anyhow::Result`.
#[macro_export]
macro_rules! env_load {
    ($type:ident, $name:ident) => {
        $type::try_new(
            std::env::var($name)
                .with_context(|| format!("Missing {} env var", $name))?,
        )
        .with_context(|| format!("{} was not formatted right", $name))?
    };
    ($type:ident, $name:ident, $type_raw:ty) => {
        $type::try_new(
            std::env::var($name)
                .with_context(|| format!("Missing {} env var", $name))?
                .parse::<$type_raw>()
                .with_context(|| {
                    format!(
                        "{} env var cannot be parsed in the correct type",
                        $name
                    )
                })?,
        )
        .with_context(|| format!("{} was not formatted right", $name))?
    };
    ($type:ident, $name:ident, $type_raw:ty, $default:expr) => {
        $type::try_new(match std::env::var($name) {
            Ok(raw) => raw.parse::<$type_raw>().with_context(|| {
                format!(
                    "{} env var cannot be parsed in the correct type",
                    $name
                )
            })?,
            Err(_) => $default,
        })
        .with_context(|| format!("{} was not formatted right", $name))?
    };
}
