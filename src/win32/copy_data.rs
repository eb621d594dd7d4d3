use crate::transport::{MessageTransport, WindowId};
use std::ffi::c_void;
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::DataExchange::COPYDATASTRUCT;
use windows::Win32::UI::WindowsAndMessaging::{
    IsIconic, SendMessageW, SetForegroundWindow, ShowWindow, MSG, SW_RESTORE, WM_COPYDATA,
};

/// Relays payloads between processes via `WM_COPYDATA`.
///
/// The payload travels as a null-terminated UTF-16 string behind a
/// `COPYDATASTRUCT` length header. Delivery is synchronous: `SendMessageW`
/// returns only after the receiving window procedure has run, so the buffer
/// never outlives the message. The host forwards inbound messages from its
/// window procedure to the coordinator, which decodes them here.
pub struct CopyDataTransport;

/// Registry identity for `hwnd`, for hosts implementing their own window
/// binding. `None` for a null handle.
pub fn window_id(hwnd: HWND) -> Option<WindowId> {
    WindowId::new(hwnd.0 as usize as u64)
}

fn hwnd_from_id(id: WindowId) -> HWND {
    HWND(id.get() as usize as *mut c_void)
}

impl MessageTransport for CopyDataTransport {
    type Raw = MSG;

    fn deliver(&self, target: WindowId, text: &str) -> bool {
        let payload: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let copy_data = COPYDATASTRUCT {
            dwData: 0,
            cbData: (payload.len() * size_of::<u16>()) as u32,
            lpData: payload.as_ptr() as *mut c_void,
        };
        // SAFETY: the call blocks until the receiver has processed the
        // message, keeping payload and copy_data valid throughout; a stale
        // target handle makes the call fail harmlessly
        let result = unsafe {
            SendMessageW(
                hwnd_from_id(target),
                WM_COPYDATA,
                WPARAM(0),
                LPARAM(&copy_data as *const COPYDATASTRUCT as isize),
            )
        };
        result.0 != 0
    }

    fn try_decode(&self, raw: &MSG) -> Option<String> {
        if raw.message != WM_COPYDATA {
            return None;
        }
        let copy_data = raw.lParam.0 as *const COPYDATASTRUCT;
        if copy_data.is_null() {
            return None;
        }
        // SAFETY: the sender keeps the struct alive for the duration of the
        // synchronous delivery we are in the middle of
        let copy_data = unsafe { &*copy_data };
        if copy_data.lpData.is_null() {
            return None;
        }
        let len = copy_data.cbData as usize / size_of::<u16>();
        // SAFETY: cbData is the byte length of the buffer behind lpData
        let units = unsafe { std::slice::from_raw_parts(copy_data.lpData as *const u16, len) };
        let units = units.strip_suffix(&[0]).unwrap_or(units);
        Some(String::from_utf16_lossy(units))
    }

    fn focus(&self, target: WindowId) {
        let hwnd = hwnd_from_id(target);
        // SAFETY: best effort against a possibly stale handle, all failures
        // are ignored
        unsafe {
            if IsIconic(hwnd).as_bool() {
                _ = ShowWindow(hwnd, SW_RESTORE);
            }
            _ = SetForegroundWindow(hwnd);
        }
    }
}
