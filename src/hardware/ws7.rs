//! HighFinesse WS7 wavemeter driver
//!
//! Binds the vendor wlmData library at runtime via libloading. The library
//! talks to the wavemeter server application; measurement calls return the
//! value or a negative sentinel code that maps onto [`WavemeterError`].

use crate::domain::Frequency;
use crate::error::WavemeterError;
use crate::hardware::traits::Wavemeter;
use libloading::{Library, Symbol};
use std::ffi::c_long;

/// Default library name, resolved through the platform loader
#[cfg(target_os = "windows")]
pub const DEFAULT_LIB: &str = "wlmData.dll";
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_LIB: &str = "libwlmData.so";

// Sentinel codes returned by GetFrequency and friends
const ERR_NO_VALUE: f64 = 0.0;
const ERR_NO_SIGNAL: f64 = -1.0;
const ERR_BAD_SIGNAL: f64 = -2.0;
const ERR_LOW_SIGNAL: f64 = -3.0;
const ERR_BIG_SIGNAL: f64 = -4.0;
const ERR_WLM_MISSING: f64 = -5.0;

// Pattern selectors
const SIGNAL1_INTERFEROMETER: c_long = 0;
const SIGNAL1_WIDE_INTERFEROMETER: c_long = 1;

// Exposure array indices (first and second CCD of signal 1)
const CCD_ARRAY_1: c_long = 1;
const CCD_ARRAY_2: c_long = 2;

const SIGNAL_NUM: c_long = 1;

type GetFrequencyFn = unsafe extern "C" fn(f64) -> f64;
type SetExposureNumFn = unsafe extern "C" fn(c_long, c_long, c_long) -> c_long;
type GetExposureNumFn = unsafe extern "C" fn(c_long, c_long, c_long) -> c_long;
type SetExposureModeNumFn = unsafe extern "C" fn(c_long, u8) -> c_long;
type SetPatternFn = unsafe extern "C" fn(c_long, c_long) -> c_long;
type GetPatternItemCountFn = unsafe extern "C" fn(c_long) -> c_long;
type GetPatternItemSizeFn = unsafe extern "C" fn(c_long) -> c_long;
type GetPatternDataFn = unsafe extern "C" fn(c_long, *mut u16) -> c_long;

/// WS7 wavemeter behind the vendor library
#[derive(Debug)]
pub struct Ws7Wavemeter {
    // Field order: symbols borrow from the library, keep it dropped last.
    get_frequency: GetFrequencyFn,
    set_exposure_num: SetExposureNumFn,
    get_exposure_num: GetExposureNumFn,
    set_exposure_mode_num: SetExposureModeNumFn,
    set_pattern: SetPatternFn,
    get_pattern_item_count: GetPatternItemCountFn,
    get_pattern_item_size: GetPatternItemSizeFn,
    get_pattern_data: GetPatternDataFn,
    _library: Library,
}

impl Ws7Wavemeter {
    /// Load the vendor library and resolve every symbol up front
    pub fn load(path: &str) -> Result<Self, WavemeterError> {
        unsafe {
            let library = Library::new(path)
                .map_err(|e| WavemeterError::LibraryNotFound(format!("{path}: {e}")))?;

            let wavemeter = Self {
                get_frequency: *Self::symbol(&library, b"GetFrequency")?,
                set_exposure_num: *Self::symbol(&library, b"SetExposureNum")?,
                get_exposure_num: *Self::symbol(&library, b"GetExposureNum")?,
                set_exposure_mode_num: *Self::symbol(&library, b"SetExposureModeNum")?,
                set_pattern: *Self::symbol(&library, b"SetPattern")?,
                get_pattern_item_count: *Self::symbol(&library, b"GetPatternItemCount")?,
                get_pattern_item_size: *Self::symbol(&library, b"GetPatternItemSize")?,
                get_pattern_data: *Self::symbol(&library, b"GetPatternData")?,
                _library: library,
            };
            log::debug!("wlmData library loaded from {}", path);
            Ok(wavemeter)
        }
    }

    unsafe fn symbol<'a, T>(
        library: &'a Library,
        name: &[u8],
    ) -> Result<Symbol<'a, T>, WavemeterError> {
        library.get(name).map_err(|e| {
            WavemeterError::LibraryNotFound(format!(
                "missing symbol {}: {e}",
                String::from_utf8_lossy(name)
            ))
        })
    }

    fn map_sentinel(value: f64) -> WavemeterError {
        if value == ERR_NO_SIGNAL || value == ERR_NO_VALUE {
            WavemeterError::NoSignal
        } else if value == ERR_BAD_SIGNAL {
            WavemeterError::BadSignal
        } else if value == ERR_LOW_SIGNAL {
            WavemeterError::LowSignal
        } else if value == ERR_BIG_SIGNAL {
            WavemeterError::HighSignal
        } else if value == ERR_WLM_MISSING {
            WavemeterError::InstrumentMissing
        } else {
            WavemeterError::Unknown(format!("sentinel {value}"))
        }
    }

    fn check_ret(ret: c_long, what: &str) -> Result<(), WavemeterError> {
        if ret < 0 {
            return Err(WavemeterError::Command(format!("{what} returned {ret}")));
        }
        Ok(())
    }

    fn read_pattern(&mut self, index: c_long) -> Result<Option<Vec<u16>>, WavemeterError> {
        let count = unsafe { (self.get_pattern_item_count)(index) };
        if count <= 0 {
            return Ok(None);
        }
        let item_size = unsafe { (self.get_pattern_item_size)(index) };
        if item_size != 2 {
            return Err(WavemeterError::Command(format!(
                "unsupported pattern item size {item_size}"
            )));
        }
        let mut buffer = vec![0u16; count as usize];
        let ret = unsafe { (self.get_pattern_data)(index, buffer.as_mut_ptr()) };
        Self::check_ret(ret, "GetPatternData")?;
        Ok(Some(buffer))
    }
}

impl Wavemeter for Ws7Wavemeter {
    fn frequency(&mut self) -> Result<Frequency, WavemeterError> {
        let value = unsafe { (self.get_frequency)(0.0) };
        if value <= 0.0 {
            return Err(Self::map_sentinel(value));
        }
        // GetFrequency reports THz
        Ok(Frequency::from_thz(value))
    }

    fn set_exposure(&mut self, expo: u32, expo2: u32) -> Result<(), WavemeterError> {
        let ret = unsafe { (self.set_exposure_num)(SIGNAL_NUM, CCD_ARRAY_1, expo as c_long) };
        Self::check_ret(ret, "SetExposureNum(ccd1)")?;
        let ret = unsafe { (self.set_exposure_num)(SIGNAL_NUM, CCD_ARRAY_2, expo2 as c_long) };
        Self::check_ret(ret, "SetExposureNum(ccd2)")
    }

    fn exposure(&mut self) -> Result<(u32, u32), WavemeterError> {
        let expo = unsafe { (self.get_exposure_num)(SIGNAL_NUM, CCD_ARRAY_1, 0) };
        Self::check_ret(expo, "GetExposureNum(ccd1)")?;
        let expo2 = unsafe { (self.get_exposure_num)(SIGNAL_NUM, CCD_ARRAY_2, 0) };
        Self::check_ret(expo2, "GetExposureNum(ccd2)")?;
        Ok((expo as u32, expo2 as u32))
    }

    fn set_auto_exposure(&mut self, enabled: bool) -> Result<(), WavemeterError> {
        let ret = unsafe { (self.set_exposure_mode_num)(SIGNAL_NUM, enabled as u8) };
        Self::check_ret(ret, "SetExposureModeNum")
    }

    fn next_pattern(&mut self, wide: bool) -> Result<Option<Vec<u16>>, WavemeterError> {
        let index = if wide {
            SIGNAL1_WIDE_INTERFEROMETER
        } else {
            SIGNAL1_INTERFEROMETER
        };
        let ret = unsafe { (self.set_pattern)(index, 1) };
        Self::check_ret(ret, "SetPattern")?;
        self.read_pattern(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_mapping() {
        assert_eq!(Ws7Wavemeter::map_sentinel(-1.0), WavemeterError::NoSignal);
        assert_eq!(Ws7Wavemeter::map_sentinel(-2.0), WavemeterError::BadSignal);
        assert_eq!(Ws7Wavemeter::map_sentinel(-3.0), WavemeterError::LowSignal);
        assert_eq!(Ws7Wavemeter::map_sentinel(-4.0), WavemeterError::HighSignal);
        assert_eq!(
            Ws7Wavemeter::map_sentinel(-5.0),
            WavemeterError::InstrumentMissing
        );
        assert!(matches!(
            Ws7Wavemeter::map_sentinel(-9.0),
            WavemeterError::Unknown(_)
        ));
    }

    #[test]
    fn test_missing_library_reports_path() {
        let err = Ws7Wavemeter::load("/nonexistent/wlmData.so").unwrap_err();
        match err {
            WavemeterError::LibraryNotFound(msg) => assert!(msg.contains("/nonexistent")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
