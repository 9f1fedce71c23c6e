//! FFI bindings for Synheart Rhythm
//!
//! C-compatible entry points so a native capture front-end can hand raw key
//! events to the engine. All inputs and outputs are JSON in null-terminated C
//! strings; returned strings must be freed with `rhythm_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::authenticator::{adapt_model, authenticate};
use crate::config::EngineConfig;
use crate::error::RhythmError;
use crate::features::extract_features;
use crate::pipeline::RhythmProcessor;
use crate::store::JsonFileModelStore;
use crate::trainer::train_model;
use crate::types::{Attempt, KeyEvent, Model, TimingVector};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Read a required string argument, recording an error if it is missing
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {name} string pointer"));
    }
    value
}

/// Turn a JSON-producing result into an owned C string or NULL
fn finish(result: Result<String, RhythmError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Extract a timing vector from a JSON array of key events.
///
/// Returns a JSON number array, or the JSON literal `null` if the attempt was
/// rejected.
///
/// # Safety
/// - `events_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_extract_features(events_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(json) = required_arg(events_json, "events JSON") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, RhythmError> {
        let events: Vec<KeyEvent> = serde_json::from_str(&json)?;
        Ok(serde_json::to_string(&extract_features(&events))?)
    })())
}

/// Train a model from a JSON array of timing vectors.
///
/// # Safety
/// - `samples_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_train_model(samples_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(json) = required_arg(samples_json, "samples JSON") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, RhythmError> {
        let samples: Vec<TimingVector> = serde_json::from_str(&json)?;
        Ok(serde_json::to_string(&train_model(&samples)?)?)
    })())
}

/// Authenticate a timing vector against a model.
///
/// # Safety
/// - `vector_json` and `model_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_authenticate(
    vector_json: *const c_char,
    model_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(vector) = required_arg(vector_json, "vector JSON") else {
        return ptr::null_mut();
    };
    let Some(model) = required_arg(model_json, "model JSON") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, RhythmError> {
        let vector: TimingVector = serde_json::from_str(&vector)?;
        let model: Model = serde_json::from_str(&model)?;
        Ok(serde_json::to_string(&authenticate(&vector, &model)?)?)
    })())
}

/// Move a center vector toward a sample: `(1 - rate) * center + rate * sample`.
///
/// # Safety
/// - `center_json` and `sample_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error; call `rhythm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rhythm_adapt_model(
    center_json: *const c_char,
    sample_json: *const c_char,
    rate: f64,
) -> *mut c_char {
    clear_last_error();

    let Some(center) = required_arg(center_json, "center JSON") else {
        return ptr::null_mut();
    };
    let Some(sample) = required_arg(sample_json, "sample JSON") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, RhythmError> {
        let center: Vec<f64> = serde_json::from_str(&center)?;
        let sample: Vec<f64> = serde_json::from_str(&sample)?;
        if center.len() != sample.len() {
            return Err(RhythmError::DimensionMismatch {
                expected: center.len(),
                actual: sample.len(),
            });
        }
        Ok(serde_json::to_string(&adapt_model(&center, &sample, rate))?)
    })())
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a RhythmProcessor backed by a JSON model file
pub struct RhythmProcessorHandle {
    processor: RhythmProcessor<JsonFileModelStore>,
}

/// Open a processor over the model store at `store_path`.
///
/// `config_json` may be NULL for the default configuration.
///
/// # Safety
/// - `store_path` must be a valid null-terminated C string.
/// - Must be freed with `rhythm_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_open(
    store_path: *const c_char,
    config_json: *const c_char,
) -> *mut RhythmProcessorHandle {
    clear_last_error();

    let Some(path) = required_arg(store_path, "store path") else {
        return ptr::null_mut();
    };
    let config_json = cstr_to_string(config_json);

    let opened = (|| -> Result<RhythmProcessor<JsonFileModelStore>, RhythmError> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json)?,
            None => EngineConfig::default(),
        };
        RhythmProcessor::new(config, JsonFileModelStore::open(path)?)
    })();

    match opened {
        Ok(processor) => Box::into_raw(Box::new(RhythmProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_open`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_free(processor: *mut RhythmProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Enroll `username` from a JSON array of attempts and save the model.
///
/// Returns `{"model": ..., "rejected": [[index, reason], ...]}`.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_open`.
/// - `username` and `attempts_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_enroll(
    processor: *mut RhythmProcessorHandle,
    username: *const c_char,
    attempts_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let Some(username) = required_arg(username, "username") else {
        return ptr::null_mut();
    };
    let Some(json) = required_arg(attempts_json, "attempts JSON") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, RhythmError> {
        let attempts: Vec<Attempt> = serde_json::from_str(&json)?;
        let (model, rejected) = handle.processor.enroll(&username, &attempts)?;
        Ok(serde_json::to_string(&serde_json::json!({
            "model": model,
            "rejected": rejected,
        }))?)
    })())
}

/// Verify one attempt for `username`, persisting any adaptive update.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `rhythm_processor_open`.
/// - `username` and `attempt_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `rhythm_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn rhythm_processor_verify(
    processor: *mut RhythmProcessorHandle,
    username: *const c_char,
    attempt_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let Some(username) = required_arg(username, "username") else {
        return ptr::null_mut();
    };
    let Some(json) = required_arg(attempt_json, "attempt JSON") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, RhythmError> {
        let attempt: Attempt = serde_json::from_str(&json)?;
        let outcome = handle.processor.verify(&username, &attempt)?;
        Ok(serde_json::to_string(&outcome)?)
    })())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Rhythm functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Rhythm function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rhythm_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Rhythm function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn rhythm_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Rhythm library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn rhythm_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
