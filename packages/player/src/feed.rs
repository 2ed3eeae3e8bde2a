use common::{FeedItem, FeedMedia, FeedPublisher};

/// One story and its media, in position order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryEntry {
    pub story_id: i32,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub project_name: Option<String>,
    pub media: Vec<FeedMedia>,
}

/// All feed stories of one publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherGroup {
    pub publisher: FeedPublisher,
    pub stories: Vec<StoryEntry>,
}

/// Group the flat feed into publishers, then stories.
///
/// The server already orders rows (newest story first, media by position).
/// Groups therefore keep first-seen order at both levels and nothing is
/// sorted here: sorting would break the server's recency order.
pub fn group_feed(items: impl IntoIterator<Item = FeedItem>) -> Vec<PublisherGroup> {
    let mut groups: Vec<PublisherGroup> = Vec::new();

    for item in items {
        let group_idx = match groups
            .iter()
            .position(|g| g.publisher.id == item.publisher.id)
        {
            Some(idx) => idx,
            None => {
                groups.push(PublisherGroup {
                    publisher: item.publisher.clone(),
                    stories: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let stories = &mut groups[group_idx].stories;

        match stories.iter_mut().find(|s| s.story_id == item.story_id) {
            Some(story) => story.media.push(item.media),
            None => stories.push(StoryEntry {
                story_id: item.story_id,
                title: item.title,
                caption: item.caption,
                project_name: item.project_name,
                media: vec![item.media],
            }),
        }
    }

    groups
}
