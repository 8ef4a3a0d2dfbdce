//! LED stick panel: four 8-LED banks summarising mains, battery, PV and
//! load at a glance.
//!
//! The physical stick driver is external; anything that can set a pixel and
//! latch the chain satisfies [`LedStick`]. Headless installs use
//! [`ConsoleStick`], which just traces the bank colours.

use tracing::debug;

use crate::mains::MainsState;
use crate::power;
use crate::state::GridState;

pub type Colour = (u8, u8, u8);

pub const STICK_LED_COUNT: usize = 8;
pub const TOTAL_LED_COUNT: usize = 32;

pub const INDEX_MAINS: usize = 24;
pub const INDEX_BAT: usize = 16;
pub const INDEX_PV: usize = 8;
pub const INDEX_LOAD: usize = 0;

pub const COLOUR_LOAD: Colour = (0, 100, 100);
pub const COLOUR_SPECIAL: Colour = (0, 30, 170);
pub const COLOUR_GOOD: Colour = (0, 150, 0);
pub const COLOUR_WARN: Colour = (120, 60, 0);
pub const COLOUR_BAD: Colour = (160, 0, 0);
pub const COLOUR_NONE: Colour = (0, 0, 0);

/// Narrow interface over the stick hardware.
pub trait LedStick: Send {
    fn set_pixel(&mut self, index: usize, colour: Colour);
    fn show(&mut self);
}

/// Stick stand-in for machines without the hardware chain.
pub struct ConsoleStick;

impl LedStick for ConsoleStick {
    fn set_pixel(&mut self, _index: usize, _colour: Colour) {}

    fn show(&mut self) {
        debug!("led chain latched");
    }
}

pub fn mains_colour(mains: MainsState) -> Colour {
    match mains {
        MainsState::Undecided => COLOUR_WARN,
        MainsState::On => COLOUR_BAD,
        MainsState::Off => COLOUR_NONE,
    }
}

pub fn pv_colour(watts: f32, pv_size: f32) -> Colour {
    if watts >= pv_size * power::PV.high {
        COLOUR_SPECIAL
    } else if watts >= pv_size * power::PV.med {
        COLOUR_GOOD
    } else if watts >= pv_size * power::PV.low {
        COLOUR_WARN
    } else {
        COLOUR_BAD
    }
}

pub fn battery_colour(soc: f32) -> Colour {
    if soc >= power::BATTERY.high {
        COLOUR_SPECIAL
    } else if soc >= power::BATTERY.med {
        COLOUR_GOOD
    } else if soc >= power::BATTERY.low {
        COLOUR_WARN
    } else {
        COLOUR_BAD
    }
}

pub fn load_colour(watts: f32) -> Colour {
    if watts >= power::LOAD_BAD {
        COLOUR_BAD
    } else if watts >= power::LOAD_WARN {
        COLOUR_WARN
    } else if watts > 0.0 {
        COLOUR_GOOD
    } else {
        COLOUR_SPECIAL
    }
}

pub struct LedPanel {
    stick: Box<dyn LedStick>,
}

impl LedPanel {
    pub fn new(mut stick: Box<dyn LedStick>) -> Self {
        // Boot fill, replaced by live data on the first update.
        for i in 0..TOTAL_LED_COUNT {
            stick.set_pixel(i, COLOUR_LOAD);
        }
        stick.show();
        Self { stick }
    }

    /// Repaint all four banks from the current grid state.
    pub fn update(&mut self, state: &GridState, mains: MainsState, pv_size: f32) {
        self.set_bank(INDEX_MAINS, mains_colour(mains));
        self.set_bank(INDEX_BAT, battery_colour(state.battery.soc));
        self.set_bank(INDEX_PV, pv_colour(state.pv.power, pv_size));
        self.set_bank(INDEX_LOAD, load_colour(state.load.power));
        self.stick.show();
    }

    /// Set one whole 8-LED stick in the chain.
    fn set_bank(&mut self, index: usize, colour: Colour) {
        for i in index..index + STICK_LED_COUNT {
            self.stick.set_pixel(i, colour);
        }
    }
}
