use std::rc::Rc;

use gloo::timers::callback::{
  Interval,
  Timeout
};
use taskflow_core::clock::Clock;
use taskflow_core::config::Config;
use taskflow_core::datetime::parse_deadline;
use taskflow_core::notify::Reminder;
use taskflow_core::scheduler::NotificationScheduler;
use taskflow_core::storage::{
  DEFAULT_STORAGE_KEY,
  MemoryStorage,
  StorageGateway
};
use taskflow_core::store::TaskStore;
use taskflow_core::task::{
  Priority,
  Task,
  TaskDraft
};
use taskflow_core::timers::TimerId;
use taskflow_core::view::{
  SortKey,
  StatusFilter,
  Theme,
  deadline_status
};
use web_sys::{
  HtmlInputElement,
  HtmlSelectElement
};
use yew::{
  Component,
  Context,
  Html,
  TargetCast,
  html
};

use crate::platform::{
  BrowserChannel,
  JsClock,
  LocalStorage,
  PageToasts,
  WebTimers
};

type Gateway = Box<dyn StorageGateway>;
type WebScheduler = NotificationScheduler<
  WebTimers,
  BrowserChannel,
  PageToasts
>;

pub enum Msg {
  TimerFired(TimerId),
  Sweep,
  DismissToast(u64),
  Query(String),
  Status(StatusFilter),
  Sort(SortKey),
  SelectCategory(String),
  FormTitle(String),
  FormDeadline(String),
  FormPriority(Priority),
  Submit,
  Toggle(String),
  Delete(String),
  ToggleTheme
}

#[derive(Default)]
struct TaskForm {
  title:    String,
  deadline: String,
  priority: Priority
}

struct Toast {
  key:      u64,
  reminder: Reminder
}

pub struct App {
  store:      TaskStore<Gateway>,
  scheduler:  WebScheduler,
  form:       TaskForm,
  toasts:     Vec<Toast>,
  next_toast: u64,
  error:      Option<String>,
  _sweep:     Interval
}

impl Component for App {
  type Message = Msg;
  type Properties = ();

  fn create(ctx: &Context<Self>) -> Self {
    let clock: Rc<dyn Clock> = Rc::new(JsClock);
    let cfg = Config::default();
    let (mut store, mut error) =
      open_store(clock);

    let scheduler_cfg =
      cfg.notifications.scheduler_config();
    let mut scheduler = NotificationScheduler::new(
      scheduler_cfg,
      WebTimers::new(
        ctx.link().callback(Msg::TimerFired)
      ),
      BrowserChannel,
      PageToasts::default()
    );

    let started = scheduler
      .arm_all(&mut store)
      .and_then(|_| scheduler.sweep(&mut store));
    if let Err(err) = started {
      tracing::error!(error = %err, "failed to arm reminders");
      error = Some(err.to_string());
    }

    let link = ctx.link().clone();
    let period_ms = scheduler_cfg
      .sweep_period
      .num_milliseconds()
      .clamp(1_000, i64::from(u32::MAX))
      as u32;
    let sweep = Interval::new(period_ms, move || {
      link.send_message(Msg::Sweep)
    });

    let mut app = Self {
      store,
      scheduler,
      form: TaskForm::default(),
      toasts: vec![],
      next_toast: 1,
      error,
      _sweep: sweep
    };
    app.collect_toasts(ctx);
    app
  }

  fn update(
    &mut self,
    ctx: &Context<Self>,
    msg: Self::Message
  ) -> bool {
    let outcome: anyhow::Result<()> = match msg {
      | Msg::TimerFired(timer) => {
        self
          .scheduler
          .on_timer(&mut self.store, timer)
          .map(|_| ())
          .map_err(Into::into)
      }
      | Msg::Sweep => {
        self
          .scheduler
          .sweep(&mut self.store)
          .map(|_| ())
          .map_err(Into::into)
      }
      | Msg::DismissToast(key) => {
        self.toasts.retain(|t| t.key != key);
        Ok(())
      }
      | Msg::Query(query) => {
        self.store.set_query(&query).map_err(Into::into)
      }
      | Msg::Status(status) => {
        self
          .store
          .set_status_filter(status)
          .map_err(Into::into)
      }
      | Msg::Sort(sort) => {
        self.store.set_sort(sort).map_err(Into::into)
      }
      | Msg::SelectCategory(id) => {
        self
          .store
          .toggle_category_filter(&id)
          .map(|_| ())
          .map_err(Into::into)
      }
      | Msg::FormTitle(title) => {
        self.form.title = title;
        Ok(())
      }
      | Msg::FormDeadline(deadline) => {
        self.form.deadline = deadline;
        Ok(())
      }
      | Msg::FormPriority(priority) => {
        self.form.priority = priority;
        Ok(())
      }
      | Msg::Submit => self.submit(),
      | Msg::Toggle(id) => {
        self
          .scheduler
          .toggle_complete(&mut self.store, &id)
          .map(|_| ())
          .map_err(Into::into)
      }
      | Msg::Delete(id) => {
        self
          .scheduler
          .delete_task(&mut self.store, &id)
          .map(|_| ())
          .map_err(Into::into)
      }
      | Msg::ToggleTheme => {
        self
          .store
          .toggle_theme()
          .map(|_| ())
          .map_err(Into::into)
      }
    };

    self.error = outcome.err().map(|err| {
      tracing::warn!(error = %err, "action refused");
      err.to_string()
    });
    self.collect_toasts(ctx);
    true
  }

  fn view(&self, ctx: &Context<Self>) -> Html {
    let link = ctx.link();
    let view = self.store.view();
    let now = self.store.now();
    let theme = match view.theme {
      | Theme::Light => "app light",
      | Theme::Dark => "app dark"
    };

    let on_query = link.callback(|e: web_sys::InputEvent| {
      Msg::Query(
        e.target_unchecked_into::<HtmlInputElement>()
          .value()
      )
    });
    let on_status = link.callback(|e: web_sys::Event| {
      let value = e
        .target_unchecked_into::<HtmlSelectElement>()
        .value();
      Msg::Status(match value.as_str() {
        | "active" => StatusFilter::Active,
        | "completed" => StatusFilter::Completed,
        | _ => StatusFilter::All
      })
    });
    let on_sort = link.callback(|e: web_sys::Event| {
      let value = e
        .target_unchecked_into::<HtmlSelectElement>()
        .value();
      Msg::Sort(match value.as_str() {
        | "deadline" => SortKey::Deadline,
        | "priority" => SortKey::Priority,
        | _ => SortKey::Created
      })
    });
    let on_title = link.callback(|e: web_sys::InputEvent| {
      Msg::FormTitle(
        e.target_unchecked_into::<HtmlInputElement>()
          .value()
      )
    });
    let on_deadline = link.callback(|e: web_sys::InputEvent| {
      Msg::FormDeadline(
        e.target_unchecked_into::<HtmlInputElement>()
          .value()
      )
    });
    let on_priority = link.callback(|e: web_sys::Event| {
      let value = e
        .target_unchecked_into::<HtmlSelectElement>()
        .value();
      Msg::FormPriority(
        value.parse().unwrap_or_default()
      )
    });
    let on_submit = link.callback(|e: web_sys::SubmitEvent| {
      e.prevent_default();
      Msg::Submit
    });

    html! {
        <div class={theme}>
            <header>
                <h1>{ "TaskFlow" }</h1>
                <p class="summary">{ self.store.stats().summary() }</p>
                <button onclick={link.callback(|_| Msg::ToggleTheme)}>{ "Theme" }</button>
            </header>
            if let Some(error) = &self.error {
                <div class="error">{ error.clone() }</div>
            }
            <nav class="categories">
                { for self.store.categories().iter().map(|category| {
                    let id = category.id.clone();
                    let active = view.category.as_deref() == Some(category.id.as_str());
                    html! {
                        <button
                            class={if active { "category on" } else { "category" }}
                            style={format!("border-color: {}", category.color)}
                            onclick={link.callback(move |_| Msg::SelectCategory(id.clone()))}
                        >
                            { category.name.clone() }
                        </button>
                    }
                }) }
            </nav>
            <form class="new-task" onsubmit={on_submit}>
                <input placeholder="New task" value={self.form.title.clone()} oninput={on_title} />
                <input type="datetime-local" value={self.form.deadline.clone()} oninput={on_deadline} />
                <select onchange={on_priority}>
                    { for [Priority::Low, Priority::Medium, Priority::High].into_iter().map(|p| html! {
                        <option value={p.as_str()} selected={p == self.form.priority}>{ p.as_str() }</option>
                    }) }
                </select>
                <button type="submit">{ "Add" }</button>
            </form>
            <div class="controls">
                <input placeholder="Search" value={view.query.clone()} oninput={on_query} />
                <select onchange={on_status}>
                    <option value="all" selected={view.status == StatusFilter::All}>{ "All" }</option>
                    <option value="active" selected={view.status == StatusFilter::Active}>{ "Active" }</option>
                    <option value="completed" selected={view.status == StatusFilter::Completed}>{ "Completed" }</option>
                </select>
                <select onchange={on_sort}>
                    <option value="created" selected={view.sort == SortKey::Created}>{ "Newest" }</option>
                    <option value="deadline" selected={view.sort == SortKey::Deadline}>{ "Deadline" }</option>
                    <option value="priority" selected={view.sort == SortKey::Priority}>{ "Priority" }</option>
                </select>
            </div>
            <ul class="tasks">
                { for self.store.visible().into_iter().map(|task| self.task_row(ctx, task, now)) }
            </ul>
            <div class="toasts">
                { for self.toasts.iter().map(|toast| {
                    let key = toast.key;
                    html! {
                        <div class="toast" key={key.to_string()}
                            onclick={link.callback(move |_| Msg::DismissToast(key))}>
                            <strong>{ toast.reminder.headline() }</strong>
                            <pre>{ toast.reminder.body() }</pre>
                        </div>
                    }
                }) }
            </div>
        </div>
    }
  }
}

impl App {
  fn submit(&mut self) -> anyhow::Result<()> {
    let mut draft = TaskDraft::new(self.form.title.clone())
      .priority(self.form.priority);
    if !self.form.deadline.trim().is_empty() {
      draft.deadline = Some(parse_deadline(
        &self.form.deadline,
        self.store.now()
      )?);
    }
    draft.category_id = self.store.view().category.clone();

    let task =
      self.scheduler.add_task(&mut self.store, draft)?;
    tracing::info!(task_id = %task.id, "task added");
    self.form = TaskForm::default();
    Ok(())
  }

  fn collect_toasts(&mut self, ctx: &Context<Self>) {
    for (reminder, dismiss_after) in
      self.scheduler.toasts_mut().drain()
    {
      let key = self.next_toast;
      self.next_toast += 1;
      self.toasts.push(Toast { key, reminder });

      let link = ctx.link().clone();
      let millis = dismiss_after
        .num_milliseconds()
        .clamp(0, i64::from(u32::MAX))
        as u32;
      Timeout::new(millis, move || {
        link.send_message(Msg::DismissToast(key))
      })
      .forget();
    }
  }

  fn task_row(
    &self,
    ctx: &Context<Self>,
    task: &Task,
    now: chrono::DateTime<chrono::Utc>
  ) -> Html {
    let link = ctx.link();
    let toggle_id = task.id.clone();
    let delete_id = task.id.clone();
    let category = self
      .store
      .category(&task.category_id)
      .map(|c| c.name.clone())
      .unwrap_or_default();
    let badge = task.deadline.filter(|_| !task.completed).map(|deadline| {
      let status = deadline_status(deadline, now);
      let class = if status.overdue {
        "badge overdue"
      } else if status.urgent {
        "badge urgent"
      } else {
        "badge"
      };
      html! { <span class={class}>{ status.label }</span> }
    });

    html! {
        <li class={if task.completed { "task done" } else { "task" }} key={task.id.clone()}>
            <input type="checkbox" checked={task.completed}
                onclick={link.callback(move |_| Msg::Toggle(toggle_id.clone()))} />
            <span class={format!("priority {}", task.priority)}>{ task.title.clone() }</span>
            <span class="category">{ category }</span>
            { for task.tags.iter().map(|tag| html! { <span class="tag">{ format!("#{tag}") }</span> }) }
            { for badge }
            <button class="delete" onclick={link.callback(move |_| Msg::Delete(delete_id.clone()))}>
                { "Delete" }
            </button>
        </li>
    }
  }
}

fn open_store(
  clock: Rc<dyn Clock>
) -> (TaskStore<Gateway>, Option<String>) {
  match TaskStore::open(
    Box::new(LocalStorage) as Gateway,
    DEFAULT_STORAGE_KEY,
    Rc::clone(&clock)
  ) {
    | Ok(store) => (store, None),
    | Err(err) => {
      tracing::error!(
        error = %err,
        "localStorage unavailable; changes will not persist"
      );
      let store = TaskStore::fresh(
        Box::new(MemoryStorage::new()) as Gateway,
        DEFAULT_STORAGE_KEY,
        clock
      );
      (store, Some(err.to_string()))
    }
  }
}
