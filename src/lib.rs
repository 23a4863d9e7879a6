mod accounts;
mod circulation;
mod config;
mod events;
mod messaging;
mod ratings;
mod reports;
mod similarity;
mod social;
mod store;

use std::sync::Arc;

use crossbeam::channel::unbounded;

pub use accounts::*;
pub use circulation::*;
pub use config::*;
pub use events::*;
pub use messaging::*;
pub use ratings::*;
pub use reports::*;
pub use similarity::*;
pub use social::*;
pub use store::*;

/// The biblios library system, facilitating book circulation, ratings,
/// messaging, and the reader social graph.
pub struct Library<S> {
    store: Arc<S>,

    pub accounts: Accounts<S>,
    pub circulation: Circulation<S>,
    pub ratings: Ratings<S>,
    pub similarity: Similarity<S>,
    pub social: SocialGraph<S>,
    pub messaging: Messaging<S>,
    pub reports: Reports<S>,

    event_receiver: EventReceiver,
}

/// A type passed to the managers of the library system, to access the store,
/// read the config, and emit events.
pub struct LibraryContext<S> {
    pub config: Config,
    pub store: Arc<S>,

    event_sender: EventSender,
}

impl<S> Library<S>
where
    S: Store,
{
    pub fn new(store: S, config: Config) -> Self {
        let store = Arc::new(store);
        let (event_sender, event_receiver) = unbounded();

        let context = LibraryContext {
            config,
            store: store.clone(),
            event_sender,
        };

        Self {
            accounts: Accounts::new(&context),
            circulation: Circulation::new(&context),
            ratings: Ratings::new(&context),
            similarity: Similarity::new(&context),
            social: SocialGraph::new(&context),
            messaging: Messaging::new(&context),
            reports: Reports::new(&context),
            store,
            event_receiver,
        }
    }

    /// Adds a book to the catalog
    pub async fn add_book(&self, new_book: NewBook) -> Result<BookData> {
        self.store.create_book(new_book).await
    }

    /// Updates a book's descriptive fields
    pub async fn update_book(&self, updated_book: UpdatedBook) -> Result<BookData> {
        self.store.update_book(updated_book).await
    }

    pub async fn book_by_id(&self, book_id: PrimaryKey) -> Result<BookData> {
        self.store.book_by_id(book_id).await
    }

    pub async fn list_books(&self) -> Result<Vec<BookData>> {
        self.store.list_books().await
    }

    /// Blocks until the next event is emitted by the system
    pub fn wait_for_event(&self) -> LibraryEvent {
        self.event_receiver
            .recv()
            .expect("event is received without error")
    }

    /// Returns the next pending event, if any
    pub fn try_event(&self) -> Option<LibraryEvent> {
        self.event_receiver.try_recv().ok()
    }
}

impl<S> LibraryContext<S>
where
    S: Store,
{
    pub fn emit(&self, event: LibraryEvent) {
        // The embedding application may run without an event consumer
        let _ = self.event_sender.send(event);
    }
}

impl<S> Clone for LibraryContext<S>
where
    S: Store,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}

// Realistically, the context should always be created by the library.
// However, in a test, this may not be possible.
#[cfg(test)]
impl LibraryContext<MemoryStore> {
    pub fn mock() -> Self {
        Self::mock_with(Config::default())
    }

    pub fn mock_with(config: Config) -> Self {
        let (event_sender, _) = unbounded();

        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            event_sender,
        }
    }
}
