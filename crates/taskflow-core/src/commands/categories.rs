use tracing::{
  info,
  instrument
};

use super::resolve_category_id;
use crate::category::{
  CategoryDraft,
  CategoryPatch
};
use crate::cli::CategoryCommand;
use crate::render::Renderer;
use crate::storage::StorageGateway;
use crate::store::TaskStore;

#[instrument(skip_all)]
pub(super) fn dispatch<S: StorageGateway>(
  store: &mut TaskStore<S>,
  renderer: &mut Renderer,
  command: CategoryCommand
) -> anyhow::Result<()> {
  match command {
    | CategoryCommand::List => {
      renderer.print_categories(
        store.categories(),
        store.tasks(),
        store.view().category.as_deref()
      )
    }
    | CategoryCommand::Add { name, color } => {
      let mut draft = CategoryDraft::new(name);
      draft.color = color;
      let category = store.add_category(draft)?;
      println!(
        "Created category {} ({}).",
        category.name, category.id
      );
      Ok(())
    }
    | CategoryCommand::Edit { id, name, color } => {
      let id = resolve_category_id(store, &id)?;
      let category = store.update_category(
        &id,
        CategoryPatch { name, color }
      )?;
      println!("Updated category {}.", category.name);
      Ok(())
    }
    | CategoryCommand::Rm { id } => {
      let id = resolve_category_id(store, &id)?;
      let removal = store.delete_category(&id)?;
      info!(
        moved = removal.moved_tasks.len(),
        "category removed"
      );
      println!(
        "Deleted category {}; moved {} task(s) to {}.",
        removal.removed.name,
        removal.moved_tasks.len(),
        removal.reassigned_to
      );
      Ok(())
    }
    | CategoryCommand::Select { id } => {
      let id = resolve_category_id(store, &id)?;
      match store.toggle_category_filter(&id)? {
        | Some(selected) => {
          println!("Showing category {selected}.")
        }
        | None => println!("Showing all categories.")
      }
      Ok(())
    }
  }
}
