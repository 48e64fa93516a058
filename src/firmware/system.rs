//! Peripheral wiring and task spawning (spec.md §2 "per-axis object
//! instantiated once per servo-stepper"). This is board-support glue:
//! it owns the concrete driver/encoder/virtual-stepper instances and
//! installs them into the servo ISR before unmasking its interrupt.

use embassy_executor::Spawner;
use embassy_stm32::gpio::OutputType;
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::Channel;
use embassy_stm32::Peripherals;
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;

use crate::firmware::control::servo_stepper::ServoStepper;
use crate::firmware::drivers::encoder::Tle5012Encoder;
use crate::firmware::drivers::phase_driver::Drv8844PhaseDriver;
use crate::firmware::drivers::virtual_stepper::AtomicVirtualStepper;
use crate::firmware::tasks::{command_loop, encoder_poll, servo_isr};

/// Default axis geometry for this board: a 200 full-step/rotation
/// motor microstepped 256 ways per full step (spec.md §3).
const FULL_STEPS_PER_ROTATION: u32 = 200;
const STEP_MULTIPLIER: i32 = 256;

static VSTEPPER: AtomicVirtualStepper = AtomicVirtualStepper::new();
static DRIVER: StaticCell<Drv8844PhaseDriver<'static, embassy_stm32::peripherals::TIM1>> = StaticCell::new();

/// Initialize peripherals, install the axis, and spawn tasks. Never
/// returns.
pub async fn initialize(spawner: Spawner, p: Peripherals) -> ! {
    defmt::info!("=== Servo-Stepper Firmware Initialization ===");

    let pwm = SimplePwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PA8, OutputType::PushPull)),
        Some(PwmPin::new(p.PA9, OutputType::PushPull)),
        None,
        None,
        Hertz(20_000),
        Default::default(),
    );
    pwm.enable(Channel::Ch1);
    pwm.enable(Channel::Ch2);

    let driver = Drv8844PhaseDriver::new(p.PA4, p.PB1, p.PB2, pwm, Channel::Ch1, Channel::Ch2);
    let driver = DRIVER.init(driver);

    let mut spi_config = SpiConfig::default();
    spi_config.frequency = Hertz(1_000_000);
    let spi = Spi::new_blocking(p.SPI1, p.PA5, p.PA7, p.PA6, spi_config);
    let encoder = Tle5012Encoder::new(spi);

    let axis = ServoStepper::new(driver, &VSTEPPER, FULL_STEPS_PER_ROTATION, STEP_MULTIPLIER);
    servo_isr::install(axis);

    // Unmask the servo-loop timer interrupt. Configuring the timer
    // itself to raise it at NOMINAL_UPDATE_HZ is register-level board
    // support outside this crate's scope (spec.md §1).
    unsafe {
        cortex_m::peripheral::NVIC::unmask(embassy_stm32::interrupt::TIM1_UP_TIM16);
    }

    // The encoder's SPI transfer runs from this command-context task,
    // not the ISR: it publishes into `servo_isr::ENCODER`, which the
    // ISR only ever reads with a non-blocking atomic load.
    spawner.spawn(encoder_poll::run(encoder)).ok();
    spawner.spawn(command_loop::run()).ok();

    defmt::info!("=== System Ready ===");

    let mut counter = 0u32;
    loop {
        Timer::after(Duration::from_secs(1)).await;
        counter = counter.wrapping_add(1);
        defmt::info!("system heartbeat: {} sec", counter);
    }
}
