//! Browser implementations of the core's host seams.

use std::collections::HashMap;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Duration,
  Utc
};
use gloo::timers::callback::Timeout;
use taskflow_core::clock::Clock;
use taskflow_core::notify::{
  NotificationChannel,
  Permission,
  Reminder,
  ToastSurface
};
use taskflow_core::storage::StorageGateway;
use taskflow_core::timers::{
  TimerDriver,
  TimerId
};
use yew::Callback;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsClock;

impl Clock for JsClock {
  fn now(&self) -> DateTime<Utc> {
    let millis = js_sys::Date::now() as i64;
    DateTime::from_timestamp_millis(millis)
      .unwrap_or_default()
  }
}

fn local_storage()
-> anyhow::Result<web_sys::Storage> {
  web_sys::window()
    .ok_or_else(|| anyhow!("no window"))?
    .local_storage()
    .map_err(|err| {
      anyhow!("localStorage unavailable: {err:?}")
    })?
    .ok_or_else(|| {
      anyhow!("localStorage disabled")
    })
}

/// `window.localStorage` as a blob store.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl StorageGateway for LocalStorage {
  fn get(
    &self,
    key: &str
  ) -> anyhow::Result<Option<String>> {
    local_storage()?.get_item(key).map_err(
      |err| anyhow!("read {key} failed: {err:?}")
    )
  }

  fn set(
    &mut self,
    key: &str,
    blob: &str
  ) -> anyhow::Result<()> {
    local_storage()?.set_item(key, blob).map_err(
      |err| {
        anyhow!("write {key} failed: {err:?}")
      }
    )
  }
}

/// One-shot `setTimeout`s that report back through a component
/// callback. Dropping a `Timeout` clears it.
pub struct WebTimers {
  next_id: TimerId,
  pending: HashMap<TimerId, Timeout>,
  on_fire: Callback<TimerId>
}

impl WebTimers {
  pub fn new(on_fire: Callback<TimerId>) -> Self {
    Self {
      next_id: 1,
      pending: HashMap::new(),
      on_fire
    }
  }
}

impl TimerDriver for WebTimers {
  fn schedule(
    &mut self,
    task_id: &str,
    delay: Duration
  ) -> TimerId {
    let id = self.next_id;
    self.next_id += 1;

    // setTimeout tops out at 2^31-1 ms; longer waits re-arm on wake.
    let millis = delay
      .num_milliseconds()
      .clamp(0, i64::from(i32::MAX))
      as u32;
    let on_fire = self.on_fire.clone();
    let timeout =
      Timeout::new(millis, move || on_fire.emit(id));
    tracing::debug!(
      timer = id,
      task_id,
      millis,
      "set browser timeout"
    );
    self.pending.insert(id, timeout);
    id
  }

  fn cancel(&mut self, timer: TimerId) {
    if let Some(timeout) = self.pending.remove(&timer) {
      timeout.cancel();
    }
  }
}

fn browser_permission() -> Permission {
  let Some(window) = web_sys::window() else {
    return Permission::Unsupported;
  };

  let has_notification = js_sys::Reflect::has(
    window.as_ref(),
    &wasm_bindgen::JsValue::from_str(
      "Notification"
    )
  )
  .unwrap_or(false);
  if !has_notification {
    return Permission::Unsupported;
  }

  match web_sys::Notification::permission() {
    | web_sys::NotificationPermission::Granted => {
      Permission::Granted
    }
    | web_sys::NotificationPermission::Denied => {
      Permission::Denied
    }
    | _ => Permission::Default
  }
}

/// The Web Notification API.
#[derive(Debug, Default)]
pub struct BrowserChannel;

impl NotificationChannel for BrowserChannel {
  fn permission(&self) -> Permission {
    browser_permission()
  }

  /// Starts the browser prompt. The answer arrives later, so this
  /// reminder is skipped and later ones see the new permission.
  fn request_permission(
    &mut self
  ) -> Permission {
    if browser_permission()
      == Permission::Unsupported
    {
      return Permission::Unsupported;
    }
    match web_sys::Notification::request_permission()
    {
      | Ok(_promise) => {
        tracing::info!(
          "requested notification permission"
        );
      }
      | Err(error) => {
        tracing::error!(
          error = ?error,
          "failed starting notification \
           permission request"
        );
      }
    }
    browser_permission()
  }

  fn deliver(
    &mut self,
    title: &str,
    body: &str,
    tag: &str
  ) -> anyhow::Result<()> {
    let options =
      web_sys::NotificationOptions::new();
    options.set_body(body);
    options.set_tag(tag);
    web_sys::Notification::new_with_options(
      title, &options
    )
    .map(|_| ())
    .map_err(|err| {
      anyhow!("notification failed: {err:?}")
    })
  }
}

/// Collects toasts for the component to render.
#[derive(Debug, Default)]
pub struct PageToasts {
  pending: Vec<(Reminder, Duration)>
}

impl PageToasts {
  pub fn drain(
    &mut self
  ) -> Vec<(Reminder, Duration)> {
    std::mem::take(&mut self.pending)
  }
}

impl ToastSurface for PageToasts {
  fn is_visible(&self) -> bool {
    web_sys::window()
      .and_then(|w| w.document())
      .map(|doc| {
        doc.visibility_state()
          == web_sys::VisibilityState::Visible
      })
      .unwrap_or(false)
  }

  fn show(
    &mut self,
    reminder: &Reminder,
    dismiss_after: Duration
  ) {
    self
      .pending
      .push((reminder.clone(), dismiss_after));
  }
}
