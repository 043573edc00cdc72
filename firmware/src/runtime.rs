//! On-device wiring: heap, logger, radio, flash, and the embassy tasks.
//!
//! Three tasks share the work. The BLE task owns the GATT connection and the
//! session driver; the button task turns GPIO edges into commands; the main
//! loop owns the [`Device`] and applies commands and session notices.

use alloc::{string::String, vec::Vec};

use bt_hci::controller::ExternalController;
use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::{TcpClient, TcpClientState};
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::ble::controller::BleConnector;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice};
use esp_storage::FlashStorage;
use log::{error, info, warn};
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::headers::ContentType;
use reqwless::request::{Method, RequestBuilder};
use static_cell::StaticCell;
use trouble_host::prelude::*;
use zeroize::Zeroizing;

use crate::config::{DEVICE_NAME, DeviceConfig};
use crate::hid::ble::HidProfile;
use crate::hid::core::{discard_pending_reports, report_receiver};
use crate::hid::session::{
    SessionDriver, SessionEvent, SessionMachine, StackReply, notice_receiver, notice_sender,
};
use crate::hid::{NOTIFY_GATE, QueuedInputChannel};
use crate::storage::{BootFlash, CredentialStore};
use crate::sync::{
    HttpRequest, HttpResponse, HttpTransport, LinkError, NetworkLink, RESPONSE_BUFFER_LEN,
    TransportError,
};
use crate::system::{self, Device, DeviceInput, WatchDisplay};
use crate::time::EmbassyClock;
use crate::ui::{Button, ButtonEvent, ButtonMap, StatusDisplay, StatusFrame};

const HEAP_SIZE: usize = 96 * 1024;
const CONNECTIONS_MAX: usize = 1;
const L2CAP_CHANNELS_MAX: usize = 2;
const TCP_BUFFER: usize = 4096;
const TLS_BUFFER: usize = 16 * 1024 + 256;
const BUTTON_POLL: Duration = Duration::from_millis(10);

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static TCP_STATE: StaticCell<TcpClientState<1, TCP_BUFFER, TCP_BUFFER>> = StaticCell::new();
static CONFIG: DeviceConfig = DeviceConfig::from_build_env();

type BootDevice = Device<
    BootFlash<'static>,
    WifiLink,
    ReqwlessTransport,
    QueuedInputChannel,
    EmbassyClock,
    WatchDisplay,
>;

pub async fn run(spawner: Spawner) -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default().with_cpu_clock(CpuClock::max()));
    esp_alloc::heap_allocator!(size: HEAP_SIZE);
    esp_println::logger::init_logger_from_env();

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let mut display = WatchDisplay;
    display.show(&StatusFrame::Banner(String::from(DEVICE_NAME)));
    info!("starting {DEVICE_NAME}");
    if let Err(err) = CONFIG.validate() {
        warn!("refresh disabled: {err}");
    }

    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(err) => halt(format_args!("radio init failed: {err:?}")).await,
    };

    let connector = match BleConnector::new(radio, peripherals.BT, Default::default()) {
        Ok(connector) => connector,
        Err(err) => halt(format_args!("BLE init failed: {err:?}")).await,
    };
    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    let (wifi, interfaces) =
        match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
            Ok(parts) => parts,
            Err(err) => halt(format_args!("Wi-Fi init failed: {err:?}")).await,
        };
    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, net_runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    let mut flash = BootFlash::new(FlashStorage::new(peripherals.FLASH));
    let Some(range) = flash.credential_partition().await else {
        halt(format_args!("credential partition not found")).await
    };
    let store = CredentialStore::new(flash, range);

    let Some(gate_writer) = NOTIFY_GATE.writer() else {
        halt(format_args!("notify gate writer already claimed")).await
    };
    let driver = SessionDriver::new(
        SessionMachine::new(CONFIG.pass_key),
        gate_writer,
        notice_sender(),
    );

    let next = Input::new(
        peripherals.GPIO39,
        InputConfig::default().with_pull(Pull::None),
    );
    let typing = Input::new(
        peripherals.GPIO37,
        InputConfig::default().with_pull(Pull::None),
    );

    let device: BootDevice = Device::boot(
        store,
        WifiLink::new(wifi, stack),
        ReqwlessTransport::new(stack, TCP_STATE.init(TcpClientState::new()), seed.rotate_left(17)),
        QueuedInputChannel::new(NOTIFY_GATE.reader()),
        EmbassyClock,
        display,
        CONFIG,
    )
    .await;

    let spawned = spawner
        .spawn(net_task(net_runner))
        .and_then(|_| spawner.spawn(ble_task(controller, driver)))
        .and_then(|_| spawner.spawn(button_task(next, typing)))
        .and_then(|_| spawner.spawn(display_task()));
    if let Err(err) = spawned {
        halt(format_args!("failed to spawn tasks: {err:?}")).await;
    }

    main_loop(device).await
}

async fn main_loop(mut device: BootDevice) -> ! {
    let commands = system::command_receiver();
    let notices = notice_receiver();
    loop {
        let input = system::next_input(&commands, &notices).await;
        if let DeviceInput::Command(command) = input {
            info!("command {command:?}");
        }
        device.handle(input).await;
    }
}

async fn halt(reason: core::fmt::Arguments<'_>) -> ! {
    error!("{reason}");
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
async fn display_task() {
    let Some(mut frames) = system::frame_receiver() else {
        warn!("no frame receiver available");
        return;
    };
    loop {
        let frame = frames.changed().await;
        for line in frame.lines() {
            esp_println::println!("{line}");
        }
    }
}

#[embassy_executor::task]
async fn button_task(next: Input<'static>, typing: Input<'static>) {
    let map = ButtonMap::new();
    let commands = system::command_sender();
    let mut next_down: Option<Instant> = None;
    let mut typing_down = false;

    loop {
        // Buttons are active low.
        let next_pressed = next.is_low();
        let typing_pressed = typing.is_low();
        let mut released = None;

        match (next_down, next_pressed) {
            (None, true) => next_down = Some(Instant::now()),
            (Some(since), false) => {
                next_down = None;
                released = Some(ButtonEvent::front_released(since.elapsed()));
            }
            _ => {}
        }
        if typing_down && !typing_pressed {
            released = released.or(Some(ButtonEvent::released(Button::Type)));
        }
        typing_down = typing_pressed;

        if let Some(event) = released
            && let Some(command) = map.resolve(&event)
            && commands.try_send(command).is_err()
        {
            warn!("command queue full, dropping {command:?}");
        }

        Timer::after(BUTTON_POLL).await;
    }
}

#[embassy_executor::task]
async fn ble_task(
    controller: ExternalController<BleConnector<'static>, 20>,
    mut driver: SessionDriver,
) {
    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();
    let address = Address::random([0xC0, 0xFF, 0xEE, 0x1D, 0x52, 0xC3]);
    let stack = trouble_host::new(controller, &mut resources)
        .set_random_address(address)
        .set_io_capabilities(IoCapabilities::DisplayOnly);
    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let profile = match HidProfile::new(DEVICE_NAME) {
        Ok(profile) => profile,
        Err(err) => {
            error!("HID profile unavailable: {err}");
            return;
        }
    };

    let _ = select(runner.run(), async {
        loop {
            if let Err(err) = serve_once(&mut peripheral, &profile, &mut driver).await {
                warn!("BLE session ended with error: {err:?}");
            }
            driver.handle(SessionEvent::Disconnected);
            let dropped = discard_pending_reports();
            if dropped > 0 {
                info!("dropped {dropped} reports queued for the old host");
            }
        }
    })
    .await;
}

/// Advertise, accept one host and serve it until it disconnects.
async fn serve_once<C: Controller>(
    peripheral: &mut Peripheral<'_, C, DefaultPacketPool>,
    profile: &HidProfile,
    driver: &mut SessionDriver,
) -> Result<(), BleHostError<C::Error>> {
    let (adv_data, scan_data) = profile.advertisement();
    let advertiser = peripheral
        .advertise(
            &AdvertisementParameters::default(),
            Advertisement::ConnectableScannableUndirected {
                adv_data,
                scan_data,
            },
        )
        .await?;
    info!("advertising as {}", profile.name);

    let server = profile.server().map_err(|_| BleHostError::BleHost(Error::OutOfMemory))?;
    let conn = advertiser.accept().await?.with_attribute_server(server)?;
    driver.handle(SessionEvent::Connected);
    driver.handle(SessionEvent::SecurityRequested);
    if let Err(err) = conn.raw().request_security() {
        warn!("security request failed: {err:?}");
    }

    let receiver = report_receiver();
    loop {
        match select(conn.next(), receiver.receive()).await {
            Either::First(event) => match event {
                GattConnectionEvent::Disconnected { reason } => {
                    info!("host disconnected: {reason:?}");
                    break;
                }
                GattConnectionEvent::PassKeyDisplay(key) => {
                    driver.handle(SessionEvent::PassKeyNotify(key.value()));
                }
                GattConnectionEvent::PassKeyConfirm(key) => {
                    driver.handle(SessionEvent::ConfirmPin(key.value()));
                    let _ = conn.pass_key_cancel();
                }
                GattConnectionEvent::PassKeyInput => {
                    if let StackReply::PassKey(key) = driver.handle(SessionEvent::PassKeyRequested) {
                        let _ = conn.pass_key_input(key);
                    }
                }
                GattConnectionEvent::PairingComplete { .. } => {
                    driver.handle(SessionEvent::AuthComplete { success: true });
                }
                GattConnectionEvent::PairingFailed(err) => {
                    warn!("pairing error: {err:?}");
                    driver.handle(SessionEvent::AuthComplete { success: false });
                }
                GattConnectionEvent::Gatt { event } => match event.accept() {
                    Ok(reply) => reply.send().await,
                    Err(err) => warn!("GATT request rejected: {err:?}"),
                },
                _ => {}
            },
            Either::Second(report) => {
                if let Err(err) = server.hid.input_report.notify(&conn, &report.to_bytes()).await {
                    warn!("input report notify failed: {err:?}");
                }
            }
        }
    }

    Ok(())
}

/// Station-mode Wi-Fi through `esp-radio` plus the `embassy-net` stack.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

impl WifiLink {
    fn new(controller: WifiController<'static>, stack: Stack<'static>) -> Self {
        Self { controller, stack }
    }
}

impl NetworkLink for WifiLink {
    async fn begin(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        let _ = self.controller.disconnect_async().await;
        let config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(String::from(ssid))
                .with_password(String::from(password)),
        );
        self.controller
            .set_config(&config)
            .map_err(|err| LinkError(alloc::format!("{err:?}")))?;
        if !matches!(self.controller.is_started(), Ok(true)) {
            self.controller
                .start_async()
                .await
                .map_err(|err| LinkError(alloc::format!("{err:?}")))?;
        }
        self.controller
            .connect()
            .map_err(|err| LinkError(alloc::format!("{err:?}")))
    }

    fn is_connected(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.is_config_up()
    }

    async fn disconnect(&mut self) {
        if let Err(err) = self.controller.disconnect_async().await {
            warn!("Wi-Fi disconnect failed: {err:?}");
        }
        if let Err(err) = self.controller.stop_async().await {
            warn!("Wi-Fi stop failed: {err:?}");
        }
    }
}

/// HTTP POST over `reqwless` on top of the `embassy-net` stack.
pub struct ReqwlessTransport {
    stack: Stack<'static>,
    tcp_state: &'static TcpClientState<1, TCP_BUFFER, TCP_BUFFER>,
    seed: u64,
}

impl ReqwlessTransport {
    fn new(
        stack: Stack<'static>,
        tcp_state: &'static TcpClientState<1, TCP_BUFFER, TCP_BUFFER>,
        seed: u64,
    ) -> Self {
        Self {
            stack,
            tcp_state,
            seed,
        }
    }
}

impl HttpTransport for ReqwlessTransport {
    async fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let tcp = TcpClient::new(self.stack, self.tcp_state);
        let dns = DnsSocket::new(self.stack);
        let mut tls_read = [0u8; TLS_BUFFER];
        let mut tls_write = [0u8; TLS_BUFFER];
        let mut client = if request.url.starts_with("https://") {
            let tls = TlsConfig::new(self.seed, &mut tls_read, &mut tls_write, TlsVerify::None);
            HttpClient::new_with_tls(&tcp, &dns, tls)
        } else {
            HttpClient::new(&tcp, &dns)
        };

        let mut rx = Zeroizing::new([0u8; RESPONSE_BUFFER_LEN]);
        let extra: Vec<(&str, &str)> = request
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
            .copied()
            .collect();

        let mut http_request = client
            .request(Method::POST, request.url)
            .await
            .map_err(|err| TransportError(alloc::format!("{err:?}")))?
            .content_type(ContentType::ApplicationJson)
            .headers(&extra)
            .body(request.body);
        let response = http_request
            .send(rx.as_mut_slice())
            .await
            .map_err(|err| TransportError(alloc::format!("{err:?}")))?;
        let status = response.status.0;
        let body = response
            .body()
            .read_to_end()
            .await
            .map_err(|err| TransportError(alloc::format!("{err:?}")))?;

        info!("POST {} -> {status}", request.url);
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
