//! Hyprland workspaces and windows, per monitor.
//!
//! Each bar shows only the workspaces mapped to its monitor (`[workspaces]`
//! in the config) and the windows on that monitor's active workspace. State is
//! read from `hyprctl -j`; clicks go back out as `hyprctl dispatch`.
//!
//! Hyprland announces changes on its event socket (`.socket2.sock`) as
//! `EVENT>>DATA` lines. [`HyprEventWatcher`] reads that socket on the GLib
//! main loop and the service re-queries once per batch of relevant events.

use std::cell::{Cell, RefCell};
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use duskbar_core::config::WorkspacesConfig;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace, warn};

use super::callbacks::{CallbackId, Callbacks};
use super::command::{CommandRunner, shell_quote};

pub const WORKSPACES_QUERY: &str = "hyprctl -j workspaces";
pub const MONITORS_QUERY: &str = "hyprctl -j monitors";
pub const CLIENTS_QUERY: &str = "hyprctl -j clients";
pub const ACTIVE_WORKSPACE_QUERY: &str = "hyprctl -j activeworkspace";
pub const ACTIVE_WINDOW_QUERY: &str = "hyprctl -j activewindow";

/// Window buttons shown per bar.
const MAX_CLIENTS: usize = 8;

/// Events that change what any bar shows.
const REFRESH_EVENTS: &[&str] = &[
    "workspace",
    "workspacev2",
    "focusedmon",
    "activewindowv2",
    "openwindow",
    "closewindow",
    "movewindow",
    "movewindowv2",
    "createworkspace",
    "createworkspacev2",
    "destroyworkspace",
    "destroyworkspacev2",
    "moveworkspace",
    "moveworkspacev2",
    "renameworkspace",
    "monitoradded",
    "monitoraddedv2",
    "monitorremoved",
    "windowtitlev2",
];

/// Whether an event line should trigger a refresh.
pub fn is_refresh_event(line: &str) -> bool {
    let name = line.split_once(">>").map_or(line, |(name, _)| name);
    REFRESH_EVENTS.contains(&name)
}

/// The running compositor's event socket, if there is one.
pub fn event_socket_path() -> Option<PathBuf> {
    let signature = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").ok()?;
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").ok();
    event_socket_path_in(runtime_dir.as_deref(), &signature)
}

/// `$XDG_RUNTIME_DIR/hypr/<sig>/.socket2.sock`, then the pre-0.40 location
/// under `/tmp/hypr`. Only paths that exist are returned.
pub fn event_socket_path_in(runtime_dir: Option<&str>, signature: &str) -> Option<PathBuf> {
    if signature.is_empty() {
        return None;
    }
    let mut candidates = Vec::new();
    if let Some(dir) = runtime_dir.filter(|d| !d.is_empty()) {
        candidates.push(Path::new(dir).join("hypr"));
    }
    candidates.push(PathBuf::from("/tmp/hypr"));
    candidates
        .into_iter()
        .map(|base| base.join(signature).join(".socket2.sock"))
        .find(|path| path.exists())
}

/// Splits a byte stream into complete lines, holding back a partial tail.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            if !text.is_empty() {
                lines.push(text.into_owned());
            }
        }
        lines
    }
}

/// Watches the compositor event socket until it closes or is dropped.
pub struct HyprEventWatcher {
    _stream: Rc<UnixStream>,
    source_id: Option<glib::SourceId>,
    alive: Rc<Cell<bool>>,
}

impl HyprEventWatcher {
    /// Connect to `path` and hand every batch of complete lines to `on_lines`.
    pub fn connect<F>(path: &Path, on_lines: F) -> io::Result<Self>
    where
        F: Fn(&[String]) + 'static,
    {
        let stream = Rc::new(UnixStream::connect(path)?);
        stream.set_nonblocking(true)?;
        debug!("HyprEvents: watching {:?}", path);

        let alive = Rc::new(Cell::new(true));
        let reader = stream.clone();
        let alive_in_source = alive.clone();
        let mut lines = LineBuffer::default();
        let source_id = glib::unix_fd_add_local(
            stream.as_raw_fd(),
            glib::IOCondition::IN | glib::IOCondition::HUP,
            move |_fd, _condition| {
                let mut buf = [0u8; 4096];
                let mut batch = Vec::new();
                let mut closed = false;
                loop {
                    match (&*reader).read(&mut buf) {
                        Ok(0) => {
                            closed = true;
                            break;
                        }
                        Ok(n) => batch.extend(lines.push(&buf[..n])),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("HyprEvents: read failed: {}", e);
                            closed = true;
                            break;
                        }
                    }
                }

                if !batch.is_empty() {
                    trace!("HyprEvents: {} lines", batch.len());
                    on_lines(&batch);
                }
                if closed {
                    warn!("HyprEvents: event socket closed");
                    alive_in_source.set(false);
                    return glib::ControlFlow::Break;
                }
                glib::ControlFlow::Continue
            },
        );

        Ok(Self {
            _stream: stream,
            source_id: Some(source_id),
            alive,
        })
    }

    /// False once the compositor closed the socket.
    pub fn is_active(&self) -> bool {
        self.alive.get()
    }
}

impl Drop for HyprEventWatcher {
    fn drop(&mut self) {
        if let Some(source_id) = self.source_id.take()
            && self.alive.get()
        {
            source_id.remove();
        }
        debug!("HyprEvents: watcher stopped");
    }
}

#[derive(Debug, Clone, Deserialize)]
struct HyprWorkspace {
    id: i64,
    #[serde(default)]
    windows: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkspaceRef {
    id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HyprMonitor {
    name: String,
    active_workspace: WorkspaceRef,
}

#[derive(Debug, Clone, Deserialize)]
struct HyprClient {
    address: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    title: String,
    workspace: WorkspaceRef,
}

#[derive(Debug, Clone, Deserialize)]
struct HyprActiveWindow {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Active,
    Occupied,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceButton {
    pub id: u32,
    pub state: WorkspaceState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientButton {
    pub address: String,
    pub class: String,
    pub title: String,
    pub focused: bool,
}

impl ClientButton {
    /// Title, or the class for untitled windows.
    pub fn tooltip(&self) -> &str {
        if self.title.is_empty() {
            &self.class
        } else {
            &self.title
        }
    }
}

/// Everything one bar's workspace section shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorView {
    pub workspaces: Vec<WorkspaceButton>,
    pub clients: Vec<ClientButton>,
}

#[derive(Debug, Clone, Default)]
struct CompositorState {
    workspaces: Vec<HyprWorkspace>,
    monitors: Vec<HyprMonitor>,
    clients: Vec<HyprClient>,
    focused_workspace: Option<i64>,
    focused_window: Option<String>,
}

fn query_json<T: DeserializeOwned>(runner: &dyn CommandRunner, command: &str) -> Option<T> {
    let text = runner.run_sync(command).text_if_success()?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            trace!("WorkspaceService: bad JSON from `{}`: {}", command, e);
            None
        }
    }
}

pub struct WorkspaceService {
    runner: Rc<dyn CommandRunner>,
    config: WorkspacesConfig,
    state: RefCell<CompositorState>,
    callbacks: Callbacks<()>,
}

impl WorkspaceService {
    pub fn new(runner: Rc<dyn CommandRunner>, config: WorkspacesConfig) -> Rc<Self> {
        Rc::new(Self {
            runner,
            config,
            state: RefCell::new(CompositorState::default()),
            callbacks: Callbacks::new(),
        })
    }

    /// Called after every refresh; read the new state with [`Self::view_for`].
    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&()) + 'static,
    {
        self.callbacks.register(callback)
    }

    /// Monitor connectors seen in the last refresh.
    pub fn monitors(&self) -> Vec<String> {
        self.state
            .borrow()
            .monitors
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    /// Workspace ids configured for a monitor connector.
    pub fn monitor_workspaces(&self, monitor: &str) -> &[u32] {
        self.config
            .monitors
            .get(monitor)
            .unwrap_or(&self.config.fallback)
    }

    pub fn refresh(&self) {
        let runner = self.runner.as_ref();
        let state = CompositorState {
            workspaces: query_json(runner, WORKSPACES_QUERY).unwrap_or_default(),
            monitors: query_json(runner, MONITORS_QUERY).unwrap_or_default(),
            clients: query_json(runner, CLIENTS_QUERY).unwrap_or_default(),
            focused_workspace: query_json::<WorkspaceRef>(runner, ACTIVE_WORKSPACE_QUERY)
                .map(|ws| ws.id),
            focused_window: query_json::<HyprActiveWindow>(runner, ACTIVE_WINDOW_QUERY)
                .and_then(|w| w.address)
                .filter(|a| !a.is_empty()),
        };
        debug!(
            "WorkspaceService: {} workspaces, {} clients, focused {:?}",
            state.workspaces.len(),
            state.clients.len(),
            state.focused_workspace
        );
        self.state.replace(state);
        self.callbacks.notify(&());
    }

    /// Existing workspaces mapped to `monitor` (sorted by id) and the windows
    /// on the workspace that monitor is showing.
    pub fn view_for(&self, monitor: &str) -> MonitorView {
        let state = self.state.borrow();
        let allowed = self.monitor_workspaces(monitor);

        let mut workspaces: Vec<WorkspaceButton> = state
            .workspaces
            .iter()
            .filter_map(|ws| {
                let id = u32::try_from(ws.id).ok()?;
                if !allowed.contains(&id) {
                    return None;
                }
                let kind = if state.focused_workspace == Some(ws.id) {
                    WorkspaceState::Active
                } else if ws.windows > 0 {
                    WorkspaceState::Occupied
                } else {
                    WorkspaceState::Empty
                };
                Some(WorkspaceButton { id, state: kind })
            })
            .collect();
        workspaces.sort_by_key(|b| b.id);

        let active_on_monitor = state
            .monitors
            .iter()
            .find(|m| m.name == monitor)
            .map(|m| m.active_workspace.id);
        let clients = match active_on_monitor {
            Some(ws_id) => state
                .clients
                .iter()
                .filter(|c| c.workspace.id == ws_id)
                .take(MAX_CLIENTS)
                .map(|c| ClientButton {
                    address: c.address.clone(),
                    class: c.class.clone(),
                    title: c.title.clone(),
                    focused: state.focused_window.as_deref() == Some(c.address.as_str()),
                })
                .collect(),
            None => Vec::new(),
        };

        MonitorView {
            workspaces,
            clients,
        }
    }

    /// Refresh once if any line in the batch is a relevant event.
    pub fn handle_events(&self, lines: &[String]) -> bool {
        let relevant = lines.iter().any(|line| is_refresh_event(line));
        if relevant {
            self.refresh();
        }
        relevant
    }

    /// Follow the compositor's event socket at `path`.
    pub fn watch(self: &Rc<Self>, path: &Path) -> io::Result<HyprEventWatcher> {
        let weak = Rc::downgrade(self);
        let watcher = HyprEventWatcher::connect(path, move |lines| {
            if let Some(this) = weak.upgrade() {
                this.handle_events(lines);
            }
        })?;
        info!("WorkspaceService: following compositor events");
        Ok(watcher)
    }

    pub fn switch_to(&self, id: u32) {
        debug!("WorkspaceService: switch to {}", id);
        self.dispatch(&format!("hyprctl dispatch workspace {}", id));
    }

    pub fn focus_window(&self, address: &str) {
        debug!("WorkspaceService: focus {}", address);
        self.dispatch(&format!(
            "hyprctl dispatch focuswindow {}",
            shell_quote(&format!("address:{}", address))
        ));
    }

    /// Run a dispatcher and re-read the state it changed.
    fn dispatch(&self, command: &str) {
        if !self.runner.run_sync(command).success {
            warn!("WorkspaceService: `{}` failed", command);
        }
        self.refresh();
    }
}
