//! Hook registration for bundle-loader.
//!
//! Hook scripts live in `hooks/` folders of an extension and of any of its
//! bundles. The file name picks the host event:
//!
//! - `doc-opened.py` binds to `doc-opened`
//! - `command-before-exec[ID_WALL].py` binds to `command-before-exec` for target `ID_WALL`
//! - `doc-saved-backup.cs` binds to `doc-saved` for target `backup`
//!
//! Files with an unknown event or an unsupported suffix are ignored.
//!
//! # Example
//!
//! ```rust,no_run
//! use bundle_loader::hooks::{HookRegistrar, InMemoryEventHost};
//! # fn demo(extension: &bundle_loader::components::Extension) {
//! let mut host = InMemoryEventHost::new();
//! let mut registrar = HookRegistrar::new();
//! let report = registrar.register_all(extension, &mut host);
//! // registering again replaces the same bindings
//! registrar.register_all(extension, &mut host);
//! assert_eq!(host.subscription_count(), report.registered.len());
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::components::identity::UNIQUE_ID_SEPARATOR;
use crate::components::{cleanup_identifier, Extension, ScriptLanguage, HOOKS_DIR_NAME};
use crate::error::LoaderError;
use crate::synth::strategies::script_invocable;
use crate::synth::{ExecutionContext, Invocable, InvocationRequest};

pub mod events;

pub use events::{match_event, HOOK_EVENTS};

// ---------------------------------------------------------------------------
// Registrations
// ---------------------------------------------------------------------------

/// One hook script bound to a host event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRegistration {
    /// Stable id, unique per extension and hook file.
    pub id: String,
    pub event_name: String,
    /// Optional event target (e.g. the command id of `command-before-exec`).
    pub event_target: Option<String>,
    pub script_path: PathBuf,
    pub language: ScriptLanguage,
    pub search_paths: Vec<PathBuf>,
    /// Unique name of the owning extension.
    pub extension_name: String,
}

impl HookRegistration {
    /// The invocable the host calls when the event fires.
    pub fn callback(&self) -> HookCallback {
        script_invocable(
            self.language.clone(),
            self.script_path.clone(),
            self.search_paths.clone(),
        )
    }
}

/// Callback handed to the host for a hook.
pub type HookCallback = Arc<dyn Invocable>;

/// Host-issued handle of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

/// Script suffixes a hook may use.
fn hook_language(path: &Path) -> Option<ScriptLanguage> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "py" => Some(ScriptLanguage::Python),
        "rb" => Some(ScriptLanguage::Ruby),
        "cs" => Some(ScriptLanguage::CSharp),
        "vb" => Some(ScriptLanguage::VisualBasic),
        _ => None,
    }
}

/// Hook id: the extension's unique name joined with the hook path relative
/// to the extension folder, cleaned and lowercased.
pub fn hook_id(extension: &Extension, script_path: &Path) -> String {
    let relative = script_path
        .strip_prefix(&extension.directory)
        .unwrap_or(script_path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    let raw = format!("{}{}{}", extension.unique_name, UNIQUE_ID_SEPARATOR, relative);
    cleanup_identifier(&raw, &[UNIQUE_ID_SEPARATOR]).to_lowercase()
}

fn scan_hooks_dir(extension: &Extension, hooks_dir: &Path, out: &mut Vec<HookRegistration>) {
    let mut files: Vec<PathBuf> = match fs::read_dir(hooks_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => return,
    };
    files.sort();

    for path in files {
        let Some(language) = hook_language(&path) else {
            debug!(path = %path.display(), "Ignoring hook file with unsupported suffix");
            continue;
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some((event, target)) = match_event(&stem) else {
            debug!(path = %path.display(), "Ignoring hook file with unknown event");
            continue;
        };

        let mut search_paths = vec![hooks_dir.to_path_buf()];
        for lib in &extension.library_search_paths {
            if !search_paths.contains(lib) {
                search_paths.push(lib.clone());
            }
        }

        out.push(HookRegistration {
            id: hook_id(extension, &path),
            event_name: event.to_string(),
            event_target: target,
            script_path: path,
            language,
            search_paths,
            extension_name: extension.unique_name.clone(),
        });
    }
}

/// Find every hook script in an already-parsed extension.
///
/// Scans the extension's own `hooks/` folder and then the `hooks/` folder of
/// every bundle, depth-first.
pub fn discover_hooks(extension: &Extension) -> Vec<HookRegistration> {
    let mut found = Vec::new();
    scan_hooks_dir(extension, &extension.directory.join(HOOKS_DIR_NAME), &mut found);
    extension.walk(&mut |component| {
        if component.is_marker() {
            return;
        }
        scan_hooks_dir(extension, &component.directory.join(HOOKS_DIR_NAME), &mut found);
    });
    found
}

// ---------------------------------------------------------------------------
// Host event API
// ---------------------------------------------------------------------------

/// Event subscription surface of the host application.
#[cfg_attr(test, mockall::automock)]
pub trait EventHost {
    /// Subscribe `callback` to the registration's event (and target, if any).
    fn subscribe(
        &mut self,
        registration: &HookRegistration,
        callback: HookCallback,
    ) -> std::result::Result<SubscriptionHandle, String>;

    /// Drop a subscription.
    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> std::result::Result<(), String>;
}

struct Subscription {
    event_name: String,
    event_target: Option<String>,
    hook_id: String,
    callback: HookCallback,
}

/// Event host kept in memory. Used by the CLI and tests.
#[derive(Default)]
pub struct InMemoryEventHost {
    next_handle: u64,
    subscriptions: BTreeMap<SubscriptionHandle, Subscription>,
}

impl InMemoryEventHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Hook ids subscribed to `event_name`, in subscription order.
    pub fn hooks_for(&self, event_name: &str) -> Vec<&str> {
        self.subscriptions
            .values()
            .filter(|s| s.event_name == event_name)
            .map(|s| s.hook_id.as_str())
            .collect()
    }

    /// Fire an event and collect the requests of every matching callback.
    /// Untargeted subscriptions match any target.
    pub fn fire(
        &self,
        event_name: &str,
        target: Option<&str>,
        ctx: &ExecutionContext,
    ) -> Vec<InvocationRequest> {
        self.subscriptions
            .values()
            .filter(|s| s.event_name == event_name)
            .filter(|s| match (&s.event_target, target) {
                (None, _) => true,
                (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
                (Some(_), None) => false,
            })
            .map(|s| s.callback.invoke(ctx))
            .collect()
    }
}

impl EventHost for InMemoryEventHost {
    fn subscribe(
        &mut self,
        registration: &HookRegistration,
        callback: HookCallback,
    ) -> std::result::Result<SubscriptionHandle, String> {
        if !events::is_known_event(&registration.event_name) {
            return Err(format!("unknown event '{}'", registration.event_name));
        }
        self.next_handle += 1;
        let handle = SubscriptionHandle(self.next_handle);
        self.subscriptions.insert(
            handle,
            Subscription {
                event_name: registration.event_name.clone(),
                event_target: registration.event_target.clone(),
                hook_id: registration.id.clone(),
                callback,
            },
        );
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> std::result::Result<(), String> {
        self.subscriptions
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| format!("unknown subscription {:?}", handle))
    }
}

// ---------------------------------------------------------------------------
// Registrar
// ---------------------------------------------------------------------------

struct Binding {
    handle: SubscriptionHandle,
    registration: HookRegistration,
}

/// Outcome of one `register_all` call.
#[derive(Debug, Default)]
pub struct HookReport {
    /// Ids registered by this call.
    pub registered: Vec<String>,
    pub failures: Vec<LoaderError>,
}

/// Tracks which hooks are bound to the host, by hook id.
#[derive(Default)]
pub struct HookRegistrar {
    bindings: HashMap<String, Binding>,
}

impl HookRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every hook of `extension`.
    ///
    /// Any existing binding with the same id is unsubscribed first, and
    /// bindings of this extension whose script has disappeared are dropped,
    /// so calling this repeatedly leaves exactly one binding per hook.
    /// A hook the host refuses is logged and skipped. When the host will not
    /// release an existing binding, that binding is kept and the hook is
    /// reported as failed instead of being subscribed twice.
    pub fn register_all(&mut self, extension: &Extension, host: &mut dyn EventHost) -> HookReport {
        let discovered = discover_hooks(extension);
        let mut report = HookReport::default();

        let stale: Vec<String> = self
            .bindings
            .iter()
            .filter(|(id, b)| {
                b.registration.extension_name == extension.unique_name
                    && !discovered.iter().any(|r| &r.id == *id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Err(reason) = self.unbind(&id, host) {
                report.failures.push(LoaderError::HookRegistration { hook_id: id, reason });
            }
        }

        for registration in discovered {
            if let Err(reason) = self.unbind(&registration.id, host) {
                report.failures.push(LoaderError::HookRegistration {
                    hook_id: registration.id,
                    reason: format!("previous binding still active: {}", reason),
                });
                continue;
            }

            match host.subscribe(&registration, registration.callback()) {
                Ok(handle) => {
                    debug!(
                        hook_id = %registration.id,
                        event = %registration.event_name,
                        target = ?registration.event_target,
                        "Registered hook"
                    );
                    report.registered.push(registration.id.clone());
                    self.bindings.insert(
                        registration.id.clone(),
                        Binding {
                            handle,
                            registration,
                        },
                    );
                }
                Err(reason) => {
                    warn!(
                        hook_id = %registration.id,
                        event = %registration.event_name,
                        reason = %reason,
                        "Host refused hook, skipping"
                    );
                    report.failures.push(LoaderError::HookRegistration {
                        hook_id: registration.id,
                        reason,
                    });
                }
            }
        }

        info!(
            extension = %extension.name,
            hooks = report.registered.len(),
            failures = report.failures.len(),
            "Registered extension hooks"
        );
        report
    }

    /// Unregister every hook owned by `extension`.
    /// Returns the number of bindings removed. Bindings the host fails to
    /// release stay tracked.
    pub fn unregister_all(&mut self, extension: &Extension, host: &mut dyn EventHost) -> usize {
        let ids: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.registration.extension_name == extension.unique_name)
            .map(|(id, _)| id.clone())
            .collect();
        let removed = ids
            .iter()
            .filter(|id| self.unbind(id, host).is_ok())
            .count();
        if removed > 0 {
            info!(extension = %extension.name, hooks = removed, "Unregistered extension hooks");
        }
        removed
    }

    /// Drop the binding for `id`, if any. The binding is kept when the host
    /// refuses to unsubscribe it.
    fn unbind(&mut self, id: &str, host: &mut dyn EventHost) -> std::result::Result<(), String> {
        let handle = match self.bindings.get(id) {
            Some(binding) => binding.handle,
            None => return Ok(()),
        };
        match host.unsubscribe(handle) {
            Ok(()) => {
                self.bindings.remove(id);
                Ok(())
            }
            Err(reason) => {
                warn!(
                    hook_id = %id,
                    reason = %reason,
                    "Host failed to unsubscribe hook, keeping binding"
                );
                Err(reason)
            }
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.bindings.contains_key(id)
    }

    /// Ids of all current bindings, sorted.
    pub fn registered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.bindings.keys().cloned().collect();
        ids.sort();
        ids
    }
}
