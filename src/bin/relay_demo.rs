//! Demo host for the instance coordinator.
//!
//! The first launch becomes the primary: it creates a window, binds it to the
//! coordinator and pumps messages, forwarding everything its window procedure
//! sees into the coordinator. Every later launch relays its command line to
//! the primary, asks it to come to the foreground and exits.

#[cfg(windows)]
mod demo {
    use instance_relay::win32::{window_id, Coordinator};
    use instance_relay::{HostWindow, LifecycleHooks, WindowId};
    use log::{info, LevelFilter, Metadata, Record};
    use std::sync::{Arc, Mutex, OnceLock};
    use windows::core::{w, Error};
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        CreateWindowExW, DefWindowProcW, DispatchMessageW, GetMessageW, LoadCursorW,
        PostQuitMessage, RegisterClassExW, TranslateMessage, CS_HREDRAW, CS_VREDRAW,
        CW_USEDEFAULT, IDC_ARROW, MSG, WINDOW_EX_STYLE, WM_COPYDATA, WM_CREATE, WM_DESTROY,
        WNDCLASSEXW, WS_OVERLAPPEDWINDOW, WS_VISIBLE,
    };

    const MONIKER: &str = "InstanceRelayDemo";

    struct StderrLogger;

    impl log::Log for StderrLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            eprintln!("[{}][{}] {}", record.level(), record.target(), record.args());
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    #[derive(Default)]
    struct DemoWindow {
        identity: Mutex<Option<WindowId>>,
        hooks: Mutex<Option<Arc<LifecycleHooks>>>,
    }

    impl DemoWindow {
        fn hooks(&self) -> Option<Arc<LifecycleHooks>> {
            self.hooks.lock().unwrap().clone()
        }

        fn created(&self, hwnd: HWND) {
            let id = window_id(hwnd);
            *self.identity.lock().unwrap() = id;
            if let (Some(id), Some(hooks)) = (id, self.hooks()) {
                (hooks.on_created)(id);
            }
        }

        fn destroyed(&self) {
            *self.identity.lock().unwrap() = None;
            if let Some(hooks) = self.hooks() {
                (hooks.on_destroyed)();
            }
        }
    }

    impl HostWindow for DemoWindow {
        fn identity(&self) -> Option<WindowId> {
            *self.identity.lock().unwrap()
        }

        fn set_lifecycle_hooks(&self, hooks: Option<LifecycleHooks>) {
            *self.hooks.lock().unwrap() = hooks.map(Arc::new);
        }
    }

    static WINDOW: OnceLock<Arc<DemoWindow>> = OnceLock::new();
    static COORDINATOR: OnceLock<Arc<Coordinator>> = OnceLock::new();

    extern "system" fn process_message(
        window: HWND,
        message: u32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        match message {
            WM_CREATE => {
                if let Some(demo_window) = WINDOW.get() {
                    demo_window.created(window);
                }
                LRESULT(0)
            }
            WM_COPYDATA => {
                let msg = MSG {
                    hwnd: window,
                    message,
                    wParam: w_param,
                    lParam: l_param,
                    ..Default::default()
                };
                if let Some(coordinator) = COORDINATOR.get() {
                    if coordinator.on_incoming_message(&msg) {
                        return LRESULT(1);
                    }
                }
                LRESULT(0)
            }
            WM_DESTROY => {
                if let Some(demo_window) = WINDOW.get() {
                    demo_window.destroyed();
                }
                // SAFETY: This is a typical response to WM_DESTROY message
                unsafe { PostQuitMessage(0) }
                LRESULT(0)
            }
            _ =>
            // SAFETY: We are in the context of message processor, validity of arguments is guaranteed by the caller (OS)
            unsafe { DefWindowProcW(window, message, w_param, l_param) },
        }
    }

    fn create_window() -> Result<HWND, Error> {
        let window_class_name = w!("InstanceRelayDemoWindow");
        // SAFETY: lpModuleName is None instead of a raw pointer
        let instance: HINSTANCE = unsafe { GetModuleHandleW(None) }?.into();
        let wnd_class_params = WNDCLASSEXW {
            cbSize: size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(process_message),
            hInstance: instance,
            // SAFETY: lpCursorName is a pre-defined constant instead of a raw pointer
            hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }?,
            lpszClassName: window_class_name,
            ..Default::default()
        };
        // SAFETY: the parameter struct is fully initialized
        let window_class_atom = unsafe { RegisterClassExW(&wnd_class_params) };
        if window_class_atom == 0 {
            return Err(Error::from_win32());
        }
        // SAFETY: the class was registered above, all other arguments are constants
        unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                window_class_name,
                w!("Instance Relay Demo"),
                WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                400,
                300,
                None,
                None,
                instance,
                None,
            )
        }
    }

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Debug))?;
        let coordinator = Coordinator::new(MONIKER)?;

        if !coordinator.is_primary_candidate() {
            let args: Vec<String> = std::env::args().skip(1).collect();
            coordinator.send(&args.join(" "))?;
            coordinator.focus_owner();
            info!("Relayed invocation to the primary instance");
            return Ok(());
        }

        _ = COORDINATOR.set(coordinator.clone());
        let window = Arc::new(DemoWindow::default());
        _ = WINDOW.set(window.clone());

        let weak = Arc::downgrade(&coordinator);
        coordinator.on_message_received(move || {
            if let Some(coordinator) = weak.upgrade() {
                for message in coordinator.drain() {
                    info!("Relayed message from another instance: {message:?}");
                }
            }
        });

        create_window()?;
        coordinator.bind(window)?;
        info!("Primary instance is up, moniker {MONIKER:?}");

        let mut msg = MSG::default();
        // SAFETY: msg is a valid pointer
        while unsafe { GetMessageW(&mut msg, None, 0, 0) }.0 > 0 {
            // SAFETY: msg comes straight from GetMessageW
            unsafe {
                _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        coordinator.dispose();
        Ok(())
    }
}

#[cfg(windows)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    demo::run()
}

#[cfg(not(windows))]
fn main() {
    eprintln!("relay_demo only runs on Windows");
}
