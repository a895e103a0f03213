//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to an `external fun` declaration
//! in RustBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! A navigation session lives on the Rust heap behind a `Mutex` and is
//! handed to Kotlin as an opaque `Long`. Location callbacks and network
//! callbacks may arrive on different threads; the mutex serializes them.
//! Calls that change the session return a JSON array of
//! [`NavigationEvent`]s, or null if the handle or input is unusable.

use std::ptr;
use std::sync::{Mutex, MutexGuard};

use jni::objects::{JClass, JString};
use jni::sys::{jdouble, jlong, jstring};
use jni::JNIEnv;

use crate::geometry::Coordinate;
use crate::location::{Heading, Location};
use crate::progress::ProgressSnapshot;
use crate::session::{NavigationEvent, Session};

/// Returns the rust-core library version.
/// Maps to: RustBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_version(
    env: JNIEnv,
    _class: JClass,
) -> jstring {
    to_jstring(&env, crate::VERSION)
}

/// Route `log` output to logcat. Safe to call more than once.
/// Maps to: RustBridge.initLogging()
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_initLogging(_env: JNIEnv, _class: JClass) {
    #[cfg(target_os = "android")]
    {
        use android_logger::Config;
        use log::LevelFilter;

        android_logger::init_once(
            Config::default()
                .with_max_level(LevelFilter::Debug)
                .with_tag("NDKarteNav"),
        );
    }
    log::info!("ndkarte-nav {} ready", crate::VERSION);
}

/// Start a session for a route document. `configJson` may be null.
/// Maps to: RustBridge.createSession(routeJson: String, configJson: String?) -> Long
///
/// Throws IllegalArgumentException and returns 0 when the documents are invalid.
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_createSession(
    mut env: JNIEnv,
    _class: JClass,
    route_json: JString,
    config_json: JString,
) -> jlong {
    let Some(route_json) = read_string(&mut env, &route_json) else {
        throw_illegal_argument(&mut env, "route document is not a string");
        return 0;
    };
    let config_json = if config_json.is_null() {
        None
    } else {
        read_string(&mut env, &config_json)
    };

    match Session::from_json(&route_json, config_json.as_deref()) {
        Ok(session) => {
            log::info!("Navigation session created");
            Box::into_raw(Box::new(Mutex::new(session))) as jlong
        }
        Err(e) => {
            log::warn!("Rejected session: {e}");
            throw_illegal_argument(&mut env, &e.to_string());
            0
        }
    }
}

/// Maps to: RustBridge.updateLocation(handle, lat, lon, altitude, accuracy, course, speed, timestamp) -> String?
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_updateLocation(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
    lat: jdouble,
    lon: jdouble,
    altitude: jdouble,
    accuracy: jdouble,
    course: jdouble,
    speed: jdouble,
    timestamp: jdouble,
) -> jstring {
    let mut location = Location::new(Coordinate::new(lat, lon))
        .with_accuracy(accuracy)
        .with_course(course)
        .with_speed(speed)
        .with_timestamp(timestamp);
    location.altitude = altitude;

    match lock_session(handle) {
        Some(mut session) => events_to_jstring(&env, &session.update_location(location)),
        None => ptr::null_mut(),
    }
}

/// Maps to: RustBridge.updateHeading(handle, trueHeading, accuracy, timestamp) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_updateHeading(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
    true_heading: jdouble,
    accuracy: jdouble,
    timestamp: jdouble,
) -> jstring {
    let heading = Heading {
        true_heading,
        accuracy,
        timestamp,
    };
    match lock_session(handle) {
        Some(mut session) => events_to_jstring(&env, &session.update_heading(heading)),
        None => ptr::null_mut(),
    }
}

/// Answer a `reroute_requested` event with the provider's document.
/// Maps to: RustBridge.deliverRoutes(handle, requestId, routesJson) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_deliverRoutes(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    request_id: jlong,
    routes_json: JString,
) -> jstring {
    let Some(routes_json) = read_string(&mut env, &routes_json) else {
        return ptr::null_mut();
    };
    match lock_session(handle) {
        Some(mut session) => {
            let events = session.deliver_routes(request_id as u64, &routes_json);
            events_to_jstring(&env, &events)
        }
        None => ptr::null_mut(),
    }
}

/// Report that the directions request failed.
/// Maps to: RustBridge.failRoutes(handle, requestId, message) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_failRoutes(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    request_id: jlong,
    message: JString,
) -> jstring {
    let message = read_string(&mut env, &message).unwrap_or_default();
    match lock_session(handle) {
        Some(mut session) => {
            let events = session.fail_routes(request_id as u64, &message);
            events_to_jstring(&env, &events)
        }
        None => ptr::null_mut(),
    }
}

/// Maps to: RustBridge.advanceLeg(handle) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_advanceLeg(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    match lock_session(handle) {
        Some(mut session) => {
            let (advanced, events) = session.advance_leg();
            log::debug!("Advance leg requested, advanced: {advanced}");
            events_to_jstring(&env, &events)
        }
        None => ptr::null_mut(),
    }
}

/// Current progress as a JSON object.
/// Maps to: RustBridge.progress(handle) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_progress(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let Some(session) = lock_session(handle) else {
        return ptr::null_mut();
    };
    let snapshot = ProgressSnapshot::from(session.controller().progress());
    match serde_json::to_string(&snapshot) {
        Ok(json) => to_jstring(&env, &json),
        Err(e) => {
            log::error!("Failed to serialize progress: {e}");
            ptr::null_mut()
        }
    }
}

/// Session statistics as a JSON object.
/// Maps to: RustBridge.sessionStats(handle) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_sessionStats(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let Some(session) = lock_session(handle) else {
        return ptr::null_mut();
    };
    match serde_json::to_string(session.stats()) {
        Ok(json) => to_jstring(&env, &json),
        Err(e) => {
            log::error!("Failed to serialize session stats: {e}");
            ptr::null_mut()
        }
    }
}

/// Called by a timer while no fixes arrive.
/// Maps to: RustBridge.deadReckon(handle, timestamp) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_deadReckon(
    env: JNIEnv,
    _class: JClass,
    handle: jlong,
    timestamp: jdouble,
) -> jstring {
    match lock_session(handle) {
        Some(mut session) => {
            let events = session.dead_reckon(timestamp);
            events_to_jstring(&env, &events)
        }
        None => ptr::null_mut(),
    }
}

/// End the session and free it. The handle must not be used afterwards.
/// Maps to: RustBridge.destroySession(handle)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_ndkarte_app_RustBridge_destroySession(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle == 0 {
        return;
    }
    // SAFETY: the handle came from createSession and Kotlin destroys it once.
    let session = unsafe { Box::from_raw(handle as *mut Mutex<Session>) };
    let mut session = session.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    session.end();
    log::info!("Navigation session destroyed");
}

fn lock_session<'a>(handle: jlong) -> Option<MutexGuard<'a, Session>> {
    if handle == 0 {
        log::warn!("Call with a null session handle");
        return None;
    }
    // SAFETY: non-zero handles come from createSession and stay valid until destroySession.
    let session = unsafe { &*(handle as *const Mutex<Session>) };
    Some(session.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match env.get_string(value) {
        Ok(s) => Some(s.into()),
        Err(e) => {
            log::warn!("Unreadable Java string: {e}");
            None
        }
    }
}

fn to_jstring(env: &JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            log::error!("Failed to create Java string: {e}");
            ptr::null_mut()
        }
    }
}

fn events_to_jstring(env: &JNIEnv, events: &[NavigationEvent]) -> jstring {
    match serde_json::to_string(events) {
        Ok(json) => to_jstring(env, &json),
        Err(e) => {
            log::error!("Failed to serialize events: {e}");
            ptr::null_mut()
        }
    }
}

fn throw_illegal_argument(env: &mut JNIEnv, message: &str) {
    if let Err(e) = env.throw_new("java/lang/IllegalArgumentException", message) {
        log::error!("Failed to throw: {e}");
    }
}
