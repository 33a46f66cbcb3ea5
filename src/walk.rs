use crate::model::Message;

/// Depth-first pre-order walk over a message and everything it forwards.
///
/// Forwarded messages are owned by their parent, so the structure is a tree and
/// cannot loop back on itself. Ids are not used for anything here: forwarded
/// copies repeat or omit them freely.
pub struct ForwardWalk<'a> {
    stack: Vec<&'a Message>,
}

pub fn walk(root: &Message) -> ForwardWalk<'_> {
    ForwardWalk { stack: vec![root] }
}

impl<'a> Iterator for ForwardWalk<'a> {
    type Item = &'a Message;

    fn next(&mut self) -> Option<Self::Item> {
        let message = self.stack.pop()?;
        self.stack.extend(message.fwd_messages.iter().rev());
        Some(message)
    }
}
