//! Controller thread redirection demo.
//!
//! Spawns a controller thread, feeds it pointer input from the main thread and
//! prints the follow-ups as they come back.
//!
//! Run with: cargo run -p horizon-lattice-dispatch --example controller_redirect

use std::sync::Arc;
use std::time::{Duration, Instant};

use horizon_lattice_dispatch::{
    ControllerRedirector, ControllerResult, DispatchConfigBuilder, EventStatus, InputController,
    MotionSample, NativeEventPump, OwnerHandle, ShutdownSignal,
};

/// Hit-tests pointer positions against a single rectangle.
struct HitTester {
    width: f32,
    height: f32,
}

impl InputController for HitTester {
    type Input = MotionSample;
    type Target = &'static str;

    fn receive_input(&self, input: &mut MotionSample) -> ControllerResult<&'static str> {
        if input.x < self.width && input.y < self.height {
            ControllerResult::new(EventStatus::ConsumeDoDefault, Some("canvas"))
        } else {
            // Outside the canvas: swallow the event.
            ControllerResult::status(EventStatus::ConsumeNoDefault)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let shutdown = ShutdownSignal::new();
    let controller_thread = DispatchConfigBuilder::new()
        .name("controller")
        .hang_threshold(Duration::from_millis(50))
        .spawn()?;
    shutdown.subscribe(controller_thread.handle());

    let main_owner = OwnerHandle::new("main");
    shutdown.subscribe(&main_owner);
    let mut main_pump =
        NativeEventPump::new(main_owner.clone()).with_idle_poll(Duration::from_millis(10));

    let redirector = ControllerRedirector::new(
        Arc::new(HitTester {
            width: 100.0,
            height: 100.0,
        }),
        controller_thread.handle().clone(),
        main_owner,
        |sample: MotionSample, result: ControllerResult<&'static str>| {
            println!(
                "pointer {} at ({}, {}) -> {:?} {:?}",
                sample.pointer_id, sample.x, sample.y, result.target, result.status
            );
            result.status
        },
    );

    for step in 0..8 {
        let sample = MotionSample::moved(1, step as f32 * 20.0, 10.0);
        let outcome = redirector.dispatch(sample);
        println!("dispatched step {step}: {:?}", outcome.status());
    }

    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        main_pump.process_one(true);
    }

    shutdown.trigger();
    controller_thread.join()?;
    Ok(())
}
