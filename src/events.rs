use crossbeam::channel::{Receiver, Sender};

use crate::{LoanData, MessageData, PrimaryKey};

pub type EventSender = Sender<LibraryEvent>;
pub type EventReceiver = Receiver<LibraryEvent>;

/// Events emitted by the library system
#[derive(Debug, Clone)]
pub enum LibraryEvent {
    /// A loan request went straight to the active state
    LoanActivated { loan: LoanData },
    /// A loan request joined a book's waitlist
    LoanQueued {
        loan: LoanData,
        /// The 1-based place in the queue the loan landed on
        position: usize,
    },
    /// The head of a waitlist took over a returned book
    LoanPromoted { loan: LoanData },
    /// An active loan was returned
    LoanReturned {
        loan_id: PrimaryKey,
        book_id: PrimaryKey,
    },
    /// A book was taken out of circulation
    BookRetired {
        book_id: PrimaryKey,
        /// How many waiting loans were cancelled with it
        cancelled_waiters: usize,
    },
    /// A book's average rating moved
    RatingChanged { book_id: PrimaryKey, average: f32 },
    /// Two users became friends
    FriendshipFormed { a: PrimaryKey, b: PrimaryKey },
    /// Two users stopped being friends
    FriendshipDissolved { a: PrimaryKey, b: PrimaryKey },
    /// A direct message was delivered
    MessageSent { message: MessageData },
}
