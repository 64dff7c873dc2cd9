use tracing::{debug, warn};

use super::{Action, ActionHolder, ActionState};
use crate::capture::{
    AeState, AfMode, AfState, AfTrigger, AwbState, CaptureResult, MeteringRectangle,
    PrecaptureTrigger,
};
use crate::metering::{Camera2MeteringTransform, MeteringRegions};

/// Points AE, AF and AWB at a set of view regions and waits for each metered
/// control to settle. Controls whose hardware accepts no regions are left alone.
pub struct MeterAction {
    regions: MeteringRegions,
    transform: Camera2MeteringTransform,
    metering_ae: bool,
    metering_af: bool,
    metering_awb: bool,
    state: ActionState,
}

impl MeterAction {
    /// `regions` are in view coordinates; `transform` maps them to the sensor.
    pub fn new(regions: MeteringRegions, transform: Camera2MeteringTransform) -> Self {
        Self {
            regions,
            transform,
            metering_ae: false,
            metering_af: false,
            metering_awb: false,
            state: ActionState::NotStarted,
        }
    }

    fn is_settled(&self, result: &CaptureResult) -> bool {
        let ae = !self.metering_ae
            || matches!(
                result.ae_state,
                Some(AeState::Converged | AeState::Locked | AeState::FlashRequired)
            );
        let af = !self.metering_af
            || matches!(
                result.af_state,
                Some(AfState::FocusedLocked | AfState::NotFocusedLocked)
            );
        let awb = !self.metering_awb
            || matches!(result.awb_state, Some(AwbState::Converged | AwbState::Locked));
        ae && af && awb
    }

    fn finish(&mut self, holder: &mut ActionHolder) {
        let builder = holder.builder_mut();
        if self.metering_af {
            builder.af_trigger = Some(AfTrigger::Idle);
        }
        if self.metering_ae {
            builder.ae_precapture_trigger = Some(PrecaptureTrigger::Idle);
        }
        if let Err(err) = holder.apply_builder() {
            warn!(error = %err, "failed to reset metering triggers");
        }
        self.state = ActionState::Completed;
    }
}

impl Action for MeterAction {
    fn state(&self) -> ActionState {
        self.state
    }

    fn start(&mut self, holder: &mut ActionHolder) {
        let sensor = self.regions.transform(&self.transform);
        let characteristics = holder.characteristics();
        let legacy = characteristics.is_legacy();
        let ae: Vec<MeteringRectangle> = sensor.get(characteristics.max_regions_ae, &self.transform);
        let af: Vec<MeteringRectangle> = sensor.get(characteristics.max_regions_af, &self.transform);
        let awb: Vec<MeteringRectangle> =
            sensor.get(characteristics.max_regions_awb, &self.transform);

        // Precapture is unavailable on legacy hardware, so AE is never awaited there.
        self.metering_ae = !ae.is_empty() && !legacy;
        self.metering_af = !af.is_empty();
        self.metering_awb = !awb.is_empty();
        if ae.is_empty() && af.is_empty() && awb.is_empty() {
            debug!("no control accepts metering regions");
            self.state = ActionState::Completed;
            return;
        }

        let builder = holder.builder_mut();
        if !ae.is_empty() {
            builder.ae_regions = ae;
        }
        if !awb.is_empty() {
            builder.awb_regions = awb;
        }
        if !af.is_empty() {
            builder.af_regions = af;
            builder.af_mode = Some(AfMode::Auto);
            builder.af_trigger = Some(AfTrigger::Start);
        }
        if self.metering_ae {
            builder.ae_precapture_trigger = Some(PrecaptureTrigger::Start);
        }

        if let Err(err) = holder.apply_builder() {
            warn!(error = %err, "failed to apply metering request");
            self.state = ActionState::Completed;
            return;
        }
        debug!(
            ae = self.metering_ae,
            af = self.metering_af,
            awb = self.metering_awb,
            "metering requested"
        );
        self.state = ActionState::Started;
    }

    fn on_capture_completed(&mut self, holder: &mut ActionHolder, result: &CaptureResult) {
        if self.is_settled(result) {
            debug!(frame = result.frame_number, "metering settled");
            self.finish(holder);
        }
    }

    fn abort(&mut self, holder: &mut ActionHolder) {
        self.finish(holder);
    }
}
