/// File name of the build description evaluated once per directory.
pub const BUILD_FILE_NAME: &str = "BUILD.lua";

/// The only label scheme understood by the resolver.
pub const FILE_SCHEME: &str = "file";

/// Attribute injected into every rule; identifies the instance within its directory.
pub const NAME_ATTR: &str = "name";

/// Environment variable overriding the default worker count.
pub const JOBS_ENV: &str = "LAZE_JOBS";
