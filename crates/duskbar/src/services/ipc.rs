//! Bar IPC for CLI → bar communication.
//!
//! Uses a Unix datagram socket in `$XDG_RUNTIME_DIR/duskbar.sock`. Keybinds
//! run `duskbar msg <message>`; the running bar dispatches each datagram to
//! the matching manager.
//!
//! Message format (one message per datagram):
//! - `toggle_popup:<name>` – toggle a named popup
//! - `close_popups` – hide every popup and the backdrop
//! - `toggle_caffeine` – flip the idle inhibitor
//! - `toggle_night_light` – manual night-light toggle (leaves auto mode)
//! - `night_light_auto:<0|1>` – enable or disable the sun schedule
//! - `brightness:<percent>` – set software brightness
//! - `workspace:<id>` – switch to a workspace
//! - `focus_window:<address>` – focus a window by its Hyprland address
//!
//! Sending is best-effort. If the bar isn't running the CLI reports the
//! error and exits; nothing is queued.

use std::cell::RefCell;
use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, warn};

type IpcCallback = Rc<RefCell<Option<Rc<dyn Fn(IpcMessage)>>>>;

const SOCKET_NAME: &str = "duskbar.sock";

/// `$XDG_RUNTIME_DIR/duskbar.sock`, or `/tmp/duskbar.sock` without a runtime dir.
pub fn socket_path() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(runtime_dir) if !runtime_dir.is_empty() => PathBuf::from(runtime_dir).join(SOCKET_NAME),
        _ => {
            warn!("XDG_RUNTIME_DIR not set, falling back to /tmp/{}", SOCKET_NAME);
            PathBuf::from("/tmp").join(SOCKET_NAME)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IpcMessage {
    TogglePopup { name: String },
    ClosePopups,
    ToggleCaffeine,
    ToggleNightLight,
    NightLightAuto { enabled: bool },
    Brightness { percent: u32 },
    SwitchWorkspace { id: u32 },
    FocusWindow { address: String },
}

impl IpcMessage {
    pub fn to_wire(&self) -> String {
        match self {
            IpcMessage::TogglePopup { name } => format!("toggle_popup:{}", name),
            IpcMessage::ClosePopups => "close_popups".to_string(),
            IpcMessage::ToggleCaffeine => "toggle_caffeine".to_string(),
            IpcMessage::ToggleNightLight => "toggle_night_light".to_string(),
            IpcMessage::NightLightAuto { enabled } => {
                format!("night_light_auto:{}", if *enabled { 1 } else { 0 })
            }
            IpcMessage::Brightness { percent } => format!("brightness:{}", percent),
            IpcMessage::SwitchWorkspace { id } => format!("workspace:{}", id),
            IpcMessage::FocusWindow { address } => format!("focus_window:{}", address),
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        let s = s.trim();
        match s {
            "close_popups" => return Some(IpcMessage::ClosePopups),
            "toggle_caffeine" => return Some(IpcMessage::ToggleCaffeine),
            "toggle_night_light" => return Some(IpcMessage::ToggleNightLight),
            _ => {}
        }
        if let Some(name) = s.strip_prefix("toggle_popup:") {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return None;
            }
            return Some(IpcMessage::TogglePopup {
                name: name.to_string(),
            });
        }
        if let Some(rest) = s.strip_prefix("night_light_auto:") {
            let enabled = match rest {
                "1" => true,
                "0" => false,
                _ => return None,
            };
            return Some(IpcMessage::NightLightAuto { enabled });
        }
        if let Some(rest) = s.strip_prefix("brightness:") {
            let percent = rest.parse().ok()?;
            return Some(IpcMessage::Brightness { percent });
        }
        if let Some(rest) = s.strip_prefix("workspace:") {
            let id = rest.parse::<u32>().ok().filter(|id| *id > 0)?;
            return Some(IpcMessage::SwitchWorkspace { id });
        }
        if let Some(address) = s.strip_prefix("focus_window:") {
            if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
                return None;
            }
            return Some(IpcMessage::FocusWindow {
                address: address.to_string(),
            });
        }
        None
    }
}

/// Send a message to the running bar.
pub fn send_ipc_message(msg: &IpcMessage) -> io::Result<()> {
    let path = socket_path();
    let socket = UnixDatagram::unbound()?;
    socket.send_to(msg.to_wire().as_bytes(), &path)?;
    Ok(())
}

/// Receives bar IPC on the GLib main loop via `unix_fd_add_local`.
pub struct IpcListener {
    _socket: UnixDatagram,
    socket_path: PathBuf,
    source_id: Option<glib::SourceId>,
    callback: IpcCallback,
}

impl IpcListener {
    /// Bind the socket (replacing a stale one) and start watching it.
    pub fn new() -> io::Result<Rc<RefCell<Self>>> {
        Self::bind(socket_path())
    }

    pub fn bind(path: PathBuf) -> io::Result<Rc<RefCell<Self>>> {
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }

        let socket = UnixDatagram::bind(&path)?;
        if let Err(e) = socket.set_nonblocking(true) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        debug!("IPC: listening on {:?}", path);

        let socket_fd = socket.as_raw_fd();
        let callback: IpcCallback = Rc::new(RefCell::new(None));
        let callback_for_watcher = callback.clone();

        let listener = Rc::new(RefCell::new(Self {
            _socket: socket,
            socket_path: path,
            source_id: None,
            callback,
        }));

        let listener_weak = Rc::downgrade(&listener);
        let source_id =
            glib::unix_fd_add_local(socket_fd, glib::IOCondition::IN, move |fd, _condition| {
                let mut buf = [0u8; 256];
                loop {
                    // SAFETY: fd belongs to the listener's socket, which outlives this source.
                    let n = unsafe {
                        libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
                    };
                    if n <= 0 {
                        break;
                    }

                    let n = n as usize;
                    let Ok(s) = std::str::from_utf8(&buf[..n]) else {
                        debug!("IPC: ignoring non-UTF-8 datagram");
                        continue;
                    };
                    debug!("IPC: received message: {:?}", s);
                    match IpcMessage::from_wire(s) {
                        Some(msg) => {
                            let cb = callback_for_watcher.borrow().clone();
                            if let Some(cb) = cb {
                                cb(msg);
                            }
                        }
                        None => debug!("IPC: ignoring unparseable message: {:?}", s),
                    }
                }

                if listener_weak.upgrade().is_none() {
                    return glib::ControlFlow::Break;
                }
                glib::ControlFlow::Continue
            });

        listener.borrow_mut().source_id = Some(source_id);
        Ok(listener)
    }

    /// Set the handler for incoming messages (replaces any previous one).
    pub fn connect<F>(&self, callback: F)
    where
        F: Fn(IpcMessage) + 'static,
    {
        *self.callback.borrow_mut() = Some(Rc::new(callback));
    }
}

impl Drop for IpcListener {
    fn drop(&mut self) {
        // The fd watch must go before the socket closes.
        if let Some(source_id) = self.source_id.take() {
            source_id.remove();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        debug!("IPC: listener stopped");
    }
}
