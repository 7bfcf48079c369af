use enum_as_inner::EnumAsInner;

/// The lifecycle state of one query subscription.
///
/// Transitions:
///
/// ```text
/// Initial/Loading --complete--> Done(outcome)
/// Done(outcome)   --begin-----> Refreshing(outcome)
/// Refreshing(old) --complete--> Done(new)
/// ```
///
/// Once a subscription has produced an outcome it never goes back to
/// `Loading`: a re-execution keeps the last outcome visible as `Refreshing`.
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum QueryResult<A, E> {
    /// Placeholder held before the subscription starts.
    Initial,

    /// The first execution is running and no outcome is known yet.
    Loading,

    /// A re-execution is running; the previous outcome stays visible.
    Refreshing(Result<A, E>),

    /// The latest execution finished with this outcome.
    Done(Result<A, E>),
}

impl<A, E> Default for QueryResult<A, E> {
    fn default() -> Self { Self::Initial }
}

impl<A, E> QueryResult<A, E> {
    /// The state entered when an execution starts.
    #[must_use]
    pub fn begin(self) -> Self {
        match self {
            Self::Initial | Self::Loading => Self::Loading,
            Self::Refreshing(current) | Self::Done(current) => {
                Self::Refreshing(current)
            }
        }
    }

    /// The state entered when an execution finishes with `outcome`.
    #[must_use]
    pub fn complete(self, outcome: Result<A, E>) -> Self { Self::Done(outcome) }

    /// Returns the latest known outcome, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&Result<A, E>> {
        match self {
            Self::Initial | Self::Loading => None,
            Self::Refreshing(current) | Self::Done(current) => Some(current),
        }
    }

    /// Returns the latest known successful value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&A> {
        self.current().and_then(|current| current.as_ref().ok())
    }

    /// Returns the latest known error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        self.current().and_then(|current| current.as_ref().err())
    }

    /// Returns `true` if no execution is running.
    #[must_use]
    pub const fn is_settled(&self) -> bool { matches!(self, Self::Done(_)) }

    /// Maps the successful value, keeping the state.
    #[must_use]
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> QueryResult<B, E> {
        match self {
            Self::Initial => QueryResult::Initial,
            Self::Loading => QueryResult::Loading,
            Self::Refreshing(current) => {
                QueryResult::Refreshing(current.map(f))
            }
            Self::Done(current) => QueryResult::Done(current.map(f)),
        }
    }
}
