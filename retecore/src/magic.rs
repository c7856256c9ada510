/// Atom returned by predicates that fail. Call criteria pass iff they do not evaluate to it.
pub const FALSE_ATOM: &str = "FALSE";

/// Atom returned by predicates that succeed.
pub const TRUE_ATOM: &str = "TRUE";

/// Atom used for absent slot values.
pub const NIL_ATOM: &str = "nil";

/// Name of the environment variable containing the path to the engine configuration file.
/// If not set, defaults to
///  (1) on Linux and macOS: `$XDG_CONFIG_HOME/retecore/engine.toml` or `$HOME/.config/retecore/engine.toml`
///  (2) on Windows: `%APPDATA%\retecore\engine.toml`
pub const ENV_ENGINE_CONFIG_PATH: &str = "RETECORE_CONFIG_PATH";

/// Default guard on ancestor walks over the template tree.
pub const DEFAULT_MAX_TEMPLATE_DEPTH: usize = 4096;

/// Default initial capacity of node memories.
pub const DEFAULT_MEMORY_CAPACITY: usize = 8;
