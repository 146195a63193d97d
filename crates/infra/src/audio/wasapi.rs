//! WASAPI-based audio session provider
//!
//! Sessions are read from the default render endpoint. Every provider call
//! enters its own COM apartment through [`ComScope`] and releases it before
//! returning, whatever the outcome.

use std::ffi::c_void;
use std::path::Path;

use audiostop_core::domain::session::{
    clamp_volume, AudioSession, AudioSessionProvider, Result, SessionError,
};
use tracing::{debug, trace};
use windows::core::{Interface, PWSTR};
use windows::Win32::Foundation::{CloseHandle, E_ACCESSDENIED, RPC_E_CHANGED_MODE};
use windows::Win32::Media::Audio::{
    eConsole, eRender, IAudioSessionControl2, IAudioSessionManager2, IMMDeviceEnumerator,
    ISimpleAudioVolume, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoTaskMemFree, CoUninitialize, CLSCTX_ALL,
    COINIT_MULTITHREADED,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
    PROCESS_QUERY_LIMITED_INFORMATION,
};

fn session_error(context: &str, error: windows::core::Error) -> SessionError {
    if error.code() == E_ACCESSDENIED {
        SessionError::AccessDenied(format!("{}: {}", context, error))
    } else {
        SessionError::Platform(format!("{}: {}", context, error))
    }
}

/// COM apartment held for the lifetime of the guard
///
/// If the thread already lives in an apartment of another model the guard
/// uses it as is and does not uninitialize on drop.
pub struct ComScope {
    owned: bool,
}

impl ComScope {
    pub fn enter() -> Result<Self> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr.is_ok() {
            Ok(Self { owned: true })
        } else if hr == RPC_E_CHANGED_MODE {
            trace!("COM already initialized in another mode");
            Ok(Self { owned: false })
        } else {
            Err(session_error("CoInitializeEx", hr.into()))
        }
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        if self.owned {
            unsafe { CoUninitialize() };
        }
    }
}

/// Audio sessions of the default output device
#[derive(Debug, Default)]
pub struct WasapiSessionProvider;

impl WasapiSessionProvider {
    pub fn new() -> Self {
        Self
    }

    /// All session controls of the default render endpoint.
    ///
    /// Must be called inside a [`ComScope`]; the controls must be dropped
    /// before the scope is.
    fn session_controls(&self) -> Result<Vec<IAudioSessionControl2>> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|e| session_error("create device enumerator", e))?;
            let device = enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|e| session_error("default audio endpoint", e))?;
            let manager: IAudioSessionManager2 = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| session_error("activate session manager", e))?;
            let sessions = manager
                .GetSessionEnumerator()
                .map_err(|e| session_error("session enumerator", e))?;
            let count = sessions
                .GetCount()
                .map_err(|e| session_error("session count", e))?;

            let mut controls = Vec::with_capacity(count.max(0) as usize);
            for index in 0..count {
                match sessions
                    .GetSession(index)
                    .and_then(|control| control.cast::<IAudioSessionControl2>())
                {
                    Ok(control) => controls.push(control),
                    Err(e) => debug!(index, error = %e, "Skipping unreadable session"),
                }
            }
            Ok(controls)
        }
    }

    fn find(&self, session: &AudioSession) -> Result<IAudioSessionControl2> {
        self.session_controls()?
            .into_iter()
            .find(|control| {
                instance_id(control)
                    .map(|id| id == session.instance_id)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SessionError::NotFound(session.process_name.clone()))
    }
}

fn instance_id(control: &IAudioSessionControl2) -> Result<String> {
    unsafe {
        let raw: PWSTR = control
            .GetSessionInstanceIdentifier()
            .map_err(|e| session_error("session identifier", e))?;
        let id = raw.to_string();
        CoTaskMemFree(Some(raw.0 as *const c_void));
        id.map_err(|e| SessionError::Platform(format!("invalid session identifier: {}", e)))
    }
}

fn simple_volume(control: &IAudioSessionControl2) -> Result<ISimpleAudioVolume> {
    control
        .cast::<ISimpleAudioVolume>()
        .map_err(|e| session_error("simple audio volume", e))
}

/// Executable file name and full image path of a process
fn process_image(pid: u32) -> Result<(String, String)> {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid)
            .map_err(|e| session_error("open process", e))?;

        let mut buffer = [0u16; 1024];
        let mut len = buffer.len() as u32;
        let queried = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(handle);
        queried.map_err(|e| session_error("query process image", e))?;

        let path = String::from_utf16_lossy(&buffer[..len as usize]);
        let name = Path::new(&path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        Ok((name, path))
    }
}

/// Snapshot one session; `None` for the system sounds session
fn describe(control: &IAudioSessionControl2) -> Result<Option<AudioSession>> {
    let process_id = unsafe { control.GetProcessId() }
        .map_err(|e| session_error("session process id", e))?;
    if process_id == 0 {
        return Ok(None);
    }

    let (process_name, full_path) = process_image(process_id)?;
    let volume = unsafe { simple_volume(control)?.GetMasterVolume() }
        .map_err(|e| session_error("get master volume", e))?;

    Ok(Some(AudioSession {
        process_name,
        process_id,
        full_path,
        volume,
        instance_id: instance_id(control)?,
    }))
}

impl AudioSessionProvider for WasapiSessionProvider {
    fn list_sessions(&self) -> Result<Vec<AudioSession>> {
        let _com = ComScope::enter()?;

        let mut sessions = Vec::new();
        for control in self.session_controls()? {
            match describe(&control) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Skipping session"),
            }
        }
        trace!(count = sessions.len(), "Listed WASAPI sessions");
        Ok(sessions)
    }

    fn get_volume(&self, session: &AudioSession) -> Result<f32> {
        let _com = ComScope::enter()?;
        let control = self.find(session)?;
        unsafe { simple_volume(&control)?.GetMasterVolume() }
            .map_err(|e| session_error("get master volume", e))
    }

    fn set_volume(&self, session: &AudioSession, volume: f32) -> Result<()> {
        let _com = ComScope::enter()?;
        let control = self.find(session)?;
        unsafe { simple_volume(&control)?.SetMasterVolume(clamp_volume(volume), std::ptr::null()) }
            .map_err(|e| session_error("set master volume", e))
    }
}
