use tracing::{
  debug,
  instrument
};

use super::resolve_category_id;
use crate::cli::ListArgs;
use crate::render::Renderer;
use crate::storage::StorageGateway;
use crate::store::TaskStore;
use crate::view::group_by_category;

/// Lists tasks through the view. Any filter given on the command line
/// becomes the new persisted view, the way the controls in the browser
/// build stay put between visits.
#[instrument(skip_all)]
pub(super) fn cmd_list<S: StorageGateway>(
  store: &mut TaskStore<S>,
  renderer: &mut Renderer,
  args: ListArgs
) -> anyhow::Result<()> {
  if let Some(query) = args.query.as_deref() {
    store.set_query(query)?;
  }
  if let Some(status) = args.status {
    store.set_status_filter(status)?;
  }
  if let Some(sort) = args.sort {
    store.set_sort(sort)?;
  }
  if let Some(token) = args.category.as_deref() {
    if token.eq_ignore_ascii_case("all") {
      store.set_category_filter(None)?;
    } else {
      let id = resolve_category_id(store, token)?;
      store.set_category_filter(Some(&id))?;
    }
  }

  let view = store.view();
  debug!(
    query = %view.query,
    status = ?view.status,
    sort = ?view.sort,
    category = ?view.category,
    "listing through view"
  );

  let visible = store.visible();
  let now = store.now();
  if args.grouped {
    let groups = group_by_category(
      store.categories(),
      &visible,
      view.category.as_deref()
    );
    renderer.print_groups(
      &groups,
      store.categories(),
      now
    )?;
  } else {
    renderer.print_task_table(
      &visible,
      store.categories(),
      now
    )?;
  }

  println!("{}", store.stats().summary());
  Ok(())
}

pub(super) fn cmd_stats<S: StorageGateway>(
  store: &TaskStore<S>,
  renderer: &mut Renderer
) -> anyhow::Result<()> {
  renderer.print_stats(store.stats())
}

pub(super) fn cmd_theme<S: StorageGateway>(
  store: &mut TaskStore<S>
) -> anyhow::Result<()> {
  let theme = store.toggle_theme()?;
  println!("Theme is now {theme:?}.");
  Ok(())
}
