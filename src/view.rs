//! View state for the pantry screen.
//!
//! The screen is an immutable [`ViewState`] snapshot driven by a pure
//! reducer, [`reduce`], which maps `(state, action)` to the next state plus
//! the [`Command`]s to run. Commands touch the store or the network and are
//! executed by [`ViewController`], which feeds their results back in as
//! actions.
//!
//! Every mutation is followed by a full [`Command::Refresh`]: the store is
//! the only source of truth and the local list is rebuilt from it each time.
//! That is fine for a pantry-sized collection; a large one would want
//! incremental patches instead.
//!
//! ```text
//!  Action ──▶ reduce ──▶ ViewState
//!                │
//!                └──▶ Commands ──▶ ViewController ──▶ store / APIs
//!                                       │
//!  Action ◀─────────────────────────────┘  (ItemsLoaded, RecipesLoaded, ...)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use crate::capture::ImageBlob;
use crate::classify::ImageClassifier;
use crate::inventory::Inventory;
use crate::models::{filter_by_name, InventoryItem, ItemDetails};
use crate::recipes::RecipeSource;

/// Fields of the "add item" form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemForm {
    pub name: String,
    pub quantity: u64,
    pub expiration_date: String,
    pub manufacture_date: String,
    /// Image picked from disk.
    pub image: Option<ImageBlob>,
    /// Frame captured from a camera.
    pub camera_image: Option<ImageBlob>,
    pub classification: String,
}

impl Default for ItemForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            quantity: 1,
            expiration_date: String::new(),
            manufacture_date: String::new(),
            image: None,
            camera_image: None,
            classification: String::new(),
        }
    }
}

impl ItemForm {
    fn details(&self) -> ItemDetails {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        ItemDetails {
            expiration_date: non_empty(&self.expiration_date),
            manufacture_date: non_empty(&self.manufacture_date),
            classification: non_empty(&self.classification),
        }
    }

    /// The image to classify: the picked file wins over a camera frame.
    fn pending_image(&self) -> Option<&ImageBlob> {
        self.image.as_ref().or(self.camera_image.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub items: Vec<InventoryItem>,
    pub search_term: String,
    pub form: ItemForm,
    pub modal_open: bool,
    pub recipes: Vec<String>,
}

impl ViewState {
    /// Items whose name contains the search term, ignoring case.
    pub fn filtered_view(&self) -> Vec<&InventoryItem> {
        filter_by_name(&self.items, &self.search_term)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reload the list from the store (initial mount or manual refresh).
    Refresh,
    SearchChanged(String),
    OpenModal,
    CloseModal,
    FormNameChanged(String),
    FormQuantityChanged(u64),
    FormExpirationChanged(String),
    FormManufactureChanged(String),
    ImageSelected(ImageBlob),
    CameraCaptured(ImageBlob),
    ClassifyImage,
    SubmitNewItem,
    /// The per-row "add" button.
    AddOne(String),
    /// The per-row "remove" button.
    RemoveOne(String),
    RequestRecipes,
    ItemsLoaded(Vec<InventoryItem>),
    RecipesLoaded(Vec<String>),
    ClassificationReceived(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Upsert {
        name: String,
        amount: u64,
        details: ItemDetails,
    },
    Decrement {
        name: String,
    },
    FetchRecipes {
        ingredients: Vec<String>,
    },
    Classify {
        image: ImageBlob,
    },
}

/// Pure transition function.
pub fn reduce(state: &ViewState, action: Action) -> (ViewState, Vec<Command>) {
    let mut next = state.clone();
    let mut commands = Vec::new();

    match action {
        Action::Refresh => commands.push(Command::Refresh),
        Action::SearchChanged(term) => next.search_term = term,
        Action::OpenModal => next.modal_open = true,
        Action::CloseModal => next.modal_open = false,
        Action::FormNameChanged(name) => next.form.name = name,
        Action::FormQuantityChanged(quantity) => next.form.quantity = quantity,
        Action::FormExpirationChanged(date) => next.form.expiration_date = date,
        Action::FormManufactureChanged(date) => next.form.manufacture_date = date,
        Action::ImageSelected(image) => next.form.image = Some(image),
        Action::CameraCaptured(image) => next.form.camera_image = Some(image),
        Action::ClassifyImage => {
            if let Some(image) = state.form.pending_image() {
                commands.push(Command::Classify {
                    image: image.clone(),
                });
            }
        }
        Action::SubmitNewItem => {
            commands.push(Command::Upsert {
                name: state.form.name.clone(),
                amount: state.form.quantity,
                details: state.form.details(),
            });
            commands.push(Command::Refresh);
            // Cleared and closed whether or not the write lands.
            next.form = ItemForm::default();
            next.modal_open = false;
        }
        Action::AddOne(name) => {
            commands.push(Command::Upsert {
                name,
                amount: 1,
                details: ItemDetails::default(),
            });
            commands.push(Command::Refresh);
        }
        Action::RemoveOne(name) => {
            commands.push(Command::Decrement { name });
            commands.push(Command::Refresh);
        }
        Action::RequestRecipes => commands.push(Command::FetchRecipes {
            ingredients: state.items.iter().map(|i| i.name.clone()).collect(),
        }),
        Action::ItemsLoaded(items) => next.items = items,
        Action::RecipesLoaded(recipes) => next.recipes = recipes,
        Action::ClassificationReceived(label) => next.form.classification = label,
    }

    (next, commands)
}

/// A command that did not complete. The view state is left as it was.
#[derive(Debug)]
pub struct EffectFailure {
    pub command: &'static str,
    pub error: anyhow::Error,
}

/// Runs the reducer and executes its commands.
pub struct ViewController {
    state: ViewState,
    inventory: Inventory,
    recipes: Arc<dyn RecipeSource>,
    classifier: Arc<dyn ImageClassifier>,
}

impl ViewController {
    pub fn new(
        inventory: Inventory,
        recipes: Arc<dyn RecipeSource>,
        classifier: Arc<dyn ImageClassifier>,
    ) -> Self {
        Self {
            state: ViewState::default(),
            inventory,
            recipes,
            classifier,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn filtered_view(&self) -> Vec<&InventoryItem> {
        self.state.filtered_view()
    }

    pub async fn refresh(&mut self) -> Vec<EffectFailure> {
        self.dispatch(Action::Refresh).await
    }

    pub async fn submit_new_item(&mut self) -> Vec<EffectFailure> {
        self.dispatch(Action::SubmitNewItem).await
    }

    /// Reduce `action`, run the resulting commands in order, and reduce the
    /// actions they produce until nothing is left.
    ///
    /// Failures are logged and returned; they never roll back state.
    pub async fn dispatch(&mut self, action: Action) -> Vec<EffectFailure> {
        let mut failures = Vec::new();
        let mut queue = VecDeque::from([action]);

        while let Some(action) = queue.pop_front() {
            let (next, commands) = reduce(&self.state, action);
            self.state = next;

            for command in commands {
                match self.execute(command).await {
                    Ok(Some(follow_up)) => queue.push_back(follow_up),
                    Ok(None) => {}
                    Err(failure) => {
                        tracing::warn!(
                            command = failure.command,
                            error = %failure.error,
                            "view command failed"
                        );
                        failures.push(failure);
                    }
                }
            }
        }

        failures
    }

    async fn execute(&self, command: Command) -> Result<Option<Action>, EffectFailure> {
        let label = command_label(&command);
        let fail = |error: anyhow::Error| EffectFailure {
            command: label,
            error,
        };

        match command {
            Command::Refresh => {
                let items = self.inventory.list_all().await.map_err(fail)?;
                Ok(Some(Action::ItemsLoaded(items)))
            }
            Command::Upsert {
                name,
                amount,
                details,
            } => {
                self.inventory
                    .upsert_increment(&name, amount, &details)
                    .await
                    .map_err(fail)?;
                Ok(None)
            }
            Command::Decrement { name } => {
                self.inventory
                    .decrement_or_delete(&name)
                    .await
                    .map_err(fail)?;
                Ok(None)
            }
            Command::FetchRecipes { ingredients } => {
                let recipes = self.recipes.suggest(&ingredients).await.map_err(fail)?;
                Ok(Some(Action::RecipesLoaded(recipes)))
            }
            Command::Classify { image } => {
                let label = self.classifier.classify(&image).await.map_err(fail)?;
                Ok(Some(Action::ClassificationReceived(label)))
            }
        }
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Refresh => "refresh",
        Command::Upsert { .. } => "upsert",
        Command::Decrement { .. } => "decrement",
        Command::FetchRecipes { .. } => "fetch_recipes",
        Command::Classify { .. } => "classify",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedRecipes {
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl RecipeSource for FixedRecipes {
        async fn suggest(&self, ingredients: &[String]) -> Result<Vec<String>> {
            self.seen.lock().unwrap().push(ingredients.to_vec());
            Ok(vec!["Omelette".to_string()])
        }
    }

    struct FailingRecipes;

    #[async_trait]
    impl RecipeSource for FailingRecipes {
        async fn suggest(&self, _ingredients: &[String]) -> Result<Vec<String>> {
            bail!("recipes API error 503: unavailable")
        }
    }

    struct LabelByName;

    #[async_trait]
    impl ImageClassifier for LabelByName {
        async fn classify(&self, image: &ImageBlob) -> Result<String> {
            Ok(format!("label:{}", image.file_name))
        }
    }

    fn controller_with(recipes: Arc<dyn RecipeSource>) -> ViewController {
        let inventory = Inventory::new(Arc::new(InMemoryStore::new()), "Inventory");
        ViewController::new(inventory, recipes, Arc::new(LabelByName))
    }

    fn controller() -> ViewController {
        controller_with(Arc::new(FixedRecipes {
            seen: Mutex::new(Vec::new()),
        }))
    }

    fn blob(name: &str) -> ImageBlob {
        ImageBlob::new(vec![0xff], name, "image/png")
    }

    #[test]
    fn test_submit_clears_form_and_closes_modal() {
        let mut state = ViewState::default();
        state.modal_open = true;
        state.form.name = "Eggs".into();
        state.form.quantity = 12;
        state.form.expiration_date = "2025-01-01".into();
        state.form.image = Some(blob("eggs.png"));
        state.form.classification = "eggs".into();

        let (next, commands) = reduce(&state, Action::SubmitNewItem);
        assert!(!next.modal_open);
        assert_eq!(next.form, ItemForm::default());
        assert_eq!(
            commands,
            vec![
                Command::Upsert {
                    name: "Eggs".into(),
                    amount: 12,
                    details: ItemDetails {
                        expiration_date: Some("2025-01-01".into()),
                        manufacture_date: None,
                        classification: Some("eggs".into()),
                    },
                },
                Command::Refresh,
            ]
        );
    }

    #[test]
    fn test_reduce_does_not_touch_input_state() {
        let state = ViewState::default();
        let (next, _) = reduce(&state, Action::SearchChanged("mi".into()));
        assert_eq!(state.search_term, "");
        assert_eq!(next.search_term, "mi");
    }

    #[test]
    fn test_classify_prefers_selected_image() {
        let mut state = ViewState::default();
        state.form.camera_image = Some(blob("camera.png"));
        let (_, commands) = reduce(&state, Action::ClassifyImage);
        assert_eq!(
            commands,
            vec![Command::Classify {
                image: blob("camera.png")
            }]
        );

        state.form.image = Some(blob("file.png"));
        let (_, commands) = reduce(&state, Action::ClassifyImage);
        assert_eq!(
            commands,
            vec![Command::Classify {
                image: blob("file.png")
            }]
        );
    }

    #[test]
    fn test_classify_without_image_is_noop() {
        let (next, commands) = reduce(&ViewState::default(), Action::ClassifyImage);
        assert!(commands.is_empty());
        assert_eq!(next, ViewState::default());
    }

    #[test]
    fn test_row_remove_is_always_one() {
        let (_, commands) = reduce(&ViewState::default(), Action::RemoveOne("Eggs".into()));
        assert_eq!(
            commands,
            vec![
                Command::Decrement {
                    name: "Eggs".into()
                },
                Command::Refresh
            ]
        );
    }

    #[test]
    fn test_filtered_view() {
        let state = ViewState {
            items: vec![
                InventoryItem::new("Milk", 1),
                InventoryItem::new("Oat Milk", 2),
                InventoryItem::new("Eggs", 12),
            ],
            search_term: "MILK".into(),
            ..Default::default()
        };
        let names: Vec<&str> = state
            .filtered_view()
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["Milk", "Oat Milk"]);
    }

    #[tokio::test]
    async fn test_submit_then_refresh_loads_items() {
        let mut ctl = controller();
        ctl.dispatch(Action::OpenModal).await;
        ctl.dispatch(Action::FormNameChanged("Eggs".into())).await;
        ctl.dispatch(Action::FormQuantityChanged(12)).await;

        let failures = ctl.submit_new_item().await;
        assert!(failures.is_empty());
        assert_eq!(ctl.state().items, vec![InventoryItem::new("Eggs", 12)]);
        assert!(!ctl.state().modal_open);

        ctl.dispatch(Action::RemoveOne("Eggs".into())).await;
        assert_eq!(ctl.state().items[0].quantity, 11);

        ctl.dispatch(Action::AddOne("Eggs".into())).await;
        assert_eq!(ctl.state().items[0].quantity, 12);
    }

    #[tokio::test]
    async fn test_failed_submit_still_clears_form() {
        let mut ctl = controller();
        ctl.dispatch(Action::OpenModal).await;
        ctl.dispatch(Action::FormNameChanged("Ghost".into())).await;
        ctl.dispatch(Action::FormQuantityChanged(0)).await;

        let failures = ctl.submit_new_item().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].command, "upsert");
        assert!(!ctl.state().modal_open);
        assert_eq!(ctl.state().form, ItemForm::default());
        assert!(ctl.state().items.is_empty());
    }

    #[tokio::test]
    async fn test_recipes_use_all_item_names() {
        let recipes = Arc::new(FixedRecipes {
            seen: Mutex::new(Vec::new()),
        });
        let mut ctl = controller_with(recipes.clone());
        ctl.dispatch(Action::AddOne("Eggs".into())).await;
        ctl.dispatch(Action::AddOne("Milk".into())).await;
        ctl.dispatch(Action::SearchChanged("egg".into())).await;

        ctl.dispatch(Action::RequestRecipes).await;
        assert_eq!(ctl.state().recipes, vec!["Omelette"]);
        assert_eq!(
            recipes.seen.lock().unwrap().as_slice(),
            &[vec!["Eggs".to_string(), "Milk".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_recipe_failure_leaves_state_alone() {
        let mut ctl = controller_with(Arc::new(FailingRecipes));
        ctl.dispatch(Action::AddOne("Eggs".into())).await;
        let before = ctl.state().clone();

        let failures = ctl.dispatch(Action::RequestRecipes).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].command, "fetch_recipes");
        assert_eq!(ctl.state(), &before);
    }

    #[tokio::test]
    async fn test_classification_fills_form_label() {
        let mut ctl = controller();
        ctl.dispatch(Action::CameraCaptured(blob("frame.png"))).await;
        ctl.dispatch(Action::ClassifyImage).await;
        assert_eq!(ctl.state().form.classification, "label:frame.png");
    }
}
