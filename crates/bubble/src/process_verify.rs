//! `ProcessImportVerifier`: runs the target interpreter in a real
//! subprocess with a scrubbed, bubble-scoped module search path,
//! executing a small harness script that attempts `import <module>` for
//! every declared top-level module and reports one JSON line per
//! attempt (spec §4.3 step 5). Tests substitute the scripted doubles in
//! `verify.rs`; this is the production embedding of [`ImportVerifier`].

use crate::verify::{ImportVerifier, VerifyFailure, VerifyOutcome};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Module search path variable the harness script consults, mirroring
/// the worker daemon's scrubbed-environment variable of the same name
/// (spec §4.6's isolation rule applies equally to verification).
const ENV_MODULE_SEARCH_PATH: &str = "PYTHONPATH";

/// Drives a real interpreter executable to smoke-import each declared
/// module, classifying failures from the harness's structured output.
pub struct ProcessImportVerifier {
    executable_path: PathBuf,
}

impl ProcessImportVerifier {
    /// Construct a verifier that shells out to `executable_path` (an
    /// interpreter resolved via the Interpreter Registry).
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self { executable_path: executable_path.into() }
    }
}

impl ImportVerifier for ProcessImportVerifier {
    fn verify(
        &self,
        modules: &[String],
        bubble_root: &Path,
        main_root: &Path,
    ) -> std::io::Result<VerifyOutcome> {
        if modules.is_empty() {
            return Ok(VerifyOutcome::default());
        }

        let search_path = format!("{}:{}", bubble_root.display(), main_root.display());

        let output = Command::new(&self.executable_path)
            .arg("-c")
            .arg(HARNESS_SCRIPT)
            .args(modules)
            .env(ENV_MODULE_SEARCH_PATH, &search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_harness_output(modules, &stdout))
    }
}

/// One `import` attempt per module named in `sys.argv`, each result
/// printed as a single JSON line so a crashed interpreter still leaves
/// partial, parseable output for every module attempted before the
/// crash.
const HARNESS_SCRIPT: &str = "\
import importlib
import json
import sys

for name in sys.argv[1:]:
    try:
        importlib.import_module(name)
        print(json.dumps({\"module\": name, \"ok\": True}))
    except ModuleNotFoundError as exc:
        print(json.dumps({\"module\": name, \"ok\": False, \"kind\": \"module_not_found\", \"detail\": str(exc)}))
    except AttributeError as exc:
        print(json.dumps({\"module\": name, \"ok\": False, \"kind\": \"symbol_not_found\", \"detail\": str(exc)}))
    except ImportError as exc:
        detail = str(exc)
        abi_markers = (\"undefined symbol\", \"wrong ELF class\", \"incompatible\")
        kind = \"abi_mismatch\" if any(marker in detail for marker in abi_markers) else \"other\"
        print(json.dumps({\"module\": name, \"ok\": False, \"kind\": kind, \"detail\": detail}))
    except Exception as exc:
        print(json.dumps({\"module\": name, \"ok\": False, \"kind\": \"other\", \"detail\": str(exc)}))
";

#[derive(serde::Deserialize)]
struct HarnessLine {
    module: String,
    ok: bool,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Parse the harness's JSON-lines stdout into a [`VerifyOutcome`].
/// Modules the harness never got to attempt (the interpreter crashed
/// partway through) count as `VerifyFailure::Other`, never silently
/// dropped.
fn parse_harness_output(modules: &[String], stdout: &str) -> VerifyOutcome {
    let mut outcome = VerifyOutcome::default();
    let mut seen = std::collections::HashSet::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(parsed) = serde_json::from_str::<HarnessLine>(line) else { continue };
        seen.insert(parsed.module.clone());
        if parsed.ok {
            outcome.succeeded.push(parsed.module);
            continue;
        }
        let detail = parsed.detail.unwrap_or_default();
        let failure = match parsed.kind.as_deref() {
            Some("module_not_found") => VerifyFailure::ModuleNotFound(parsed.module.clone()),
            Some("symbol_not_found") => {
                VerifyFailure::SymbolNotFound { module: parsed.module.clone(), symbol: detail }
            }
            Some("abi_mismatch") => VerifyFailure::AbiMismatch(parsed.module.clone()),
            _ => VerifyFailure::Other(detail),
        };
        outcome.failed.push((parsed.module, failure));
    }

    for module in modules {
        if !seen.contains(module) {
            outcome.failed.push((
                module.clone(),
                VerifyFailure::Other(format!("harness never reported a result for '{module}'")),
            ));
        }
    }

    outcome
}
