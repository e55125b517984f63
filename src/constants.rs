// src/constants.rs

/// The descriptor file that marks a directory as a test suite root.
pub const SUITE_DESCRIPTOR_FILENAME: &str = "testsuite.toml";

/// The directory (relative to the suite root) that holds test descriptors.
pub const SUITE_TESTS_DIR: &str = "tests";

/// The metadata directory inside every work directory.
pub const WORKDIR_META_DIR: &str = ".suiterun";

/// The identity record of a work directory (inside `.suiterun/`).
pub const WORKDIR_REF_FILENAME: &str = "workdir_ref.bin";

/// The stored template reference of a work directory (inside `.suiterun/`).
pub const TEMPLATE_REF_FILENAME: &str = "template.ref";

/// The configuration last used in a work directory (inside `.suiterun/`).
pub const WORKDIR_CONFIG_FILENAME: &str = "config.json";

/// The results of the last test run in a work directory (inside `.suiterun/`).
pub const RESULTS_FILENAME: &str = "results.bin";

/// The launcher settings file (in `~/.config/suiterun/`).
pub const SETTINGS_FILENAME: &str = "settings.toml";

/// The last-used work directory per test suite (in `~/.config/suiterun/`).
pub const LAST_USED_FILENAME: &str = "last_used.bin";

/// Environment variable that overrides the launcher configuration directory.
pub const CONFIG_DIR_ENV: &str = "SUITERUN_CONFIG_DIR";

/// File extension of configuration files. Anything else is read as bootstrap properties.
pub const CONFIG_FILE_EXTENSION: &str = "json";

/// The one key a bootstrap properties file must carry.
pub const BOOTSTRAP_TESTSUITE_KEY: &str = "TESTSUITE";

/// Configuration key for the number of tests run at the same time.
pub const KEY_CONCURRENCY: &str = "concurrency";

/// Configuration key for the multiplier applied to every test timeout.
pub const KEY_TIMEOUT_FACTOR: &str = "timeoutFactor";

/// Configuration key for the whitespace-separated test selection patterns.
pub const KEY_TESTS: &str = "tests";

/// Upper bound accepted for `concurrency`.
pub const MAX_CONCURRENCY: usize = 256;

/// How deep `@file` command files may include each other.
pub const MAX_COMMAND_FILE_DEPTH: u32 = 8;

/// Process exit status when every selected test passed (or nothing ran).
pub const EXIT_OK: i32 = 0;

/// Process exit status when at least one test failed.
pub const EXIT_FAILED: i32 = 1;

/// Process exit status when at least one test could not be run properly.
pub const EXIT_ERROR: i32 = 2;

/// Process exit status when a command could not be built or executed.
pub const EXIT_FAULT: i32 = 3;

/// Environment variable carrying the name of the running test.
pub const ENV_TEST_NAME: &str = "SUITERUN_TEST_NAME";

/// Environment variable carrying the work directory of the running test.
pub const ENV_WORK_DIR: &str = "SUITERUN_WORK_DIR";

/// Environment variable carrying the suite root of the running test.
pub const ENV_SUITE_ROOT: &str = "SUITERUN_SUITE_ROOT";

/// Per-test output logs (inside `.suiterun/`).
pub const LOGS_DIR: &str = "logs";
