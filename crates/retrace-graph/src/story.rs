//! Stories
//!
//! A story is an ordered list of slides. A slide either points at a state
//! of the graph, and playing it jumps there, or carries plain text.

use crate::error::ProvenanceError;
use crate::events::GraphEvent;
use crate::graph::ProvenanceGraph;
use retrace_model::{StateId, StoryId};
use serde::{Deserialize, Serialize};

/// Title used when a story is extracted without one
pub const UNNAMED_STORY: &str = "Unnamed Story";

/// Text of the closing slide
pub const END_SLIDE_TEXT: &str = "Thanks";

/// One slide of a story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide {
    /// Display name
    pub name: String,
    /// State shown by the slide
    #[serde(default)]
    pub state: Option<StateId>,
    /// Text shown instead of a state
    #[serde(default)]
    pub text: Option<String>,
}

impl Slide {
    /// Slide showing a state
    #[must_use]
    pub fn of_state(name: impl Into<String>, state: StateId) -> Self {
        Self {
            name: name.into(),
            state: Some(state),
            text: None,
        }
    }

    /// Text-only slide
    #[must_use]
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
            text: Some(text.into()),
        }
    }

    /// True if playing the slide changes nothing
    #[inline]
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.state.is_none()
    }
}

/// Ordered slide sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Graph-unique id
    pub id: StoryId,
    /// Title
    pub title: String,
    /// Slides in playing order
    pub slides: Vec<Slide>,
}

impl Story {
    fn out_of_range(&self, index: usize) -> ProvenanceError {
        ProvenanceError::SlideOutOfRange { story: self.id, index }
    }

    /// Insert `slide` before `index`. An index equal to the length appends.
    ///
    /// # Errors
    /// Returns [`ProvenanceError::SlideOutOfRange`] past the end
    pub fn insert(&mut self, index: usize, slide: Slide) -> Result<(), ProvenanceError> {
        if index > self.slides.len() {
            return Err(self.out_of_range(index));
        }
        self.slides.insert(index, slide);
        Ok(())
    }

    /// Append `slide`
    pub fn push(&mut self, slide: Slide) {
        self.slides.push(slide);
    }

    /// Move the slide at `from` so that it ends up at `to`
    ///
    /// # Errors
    /// Returns [`ProvenanceError::SlideOutOfRange`] if either index is past
    /// the last slide
    pub fn move_slide(&mut self, from: usize, to: usize) -> Result<(), ProvenanceError> {
        let len = self.slides.len();
        if from >= len {
            return Err(self.out_of_range(from));
        }
        if to >= len {
            return Err(self.out_of_range(to));
        }
        let slide = self.slides.remove(from);
        self.slides.insert(to, slide);
        Ok(())
    }

    /// Remove and return the slide at `index`
    ///
    /// # Errors
    /// Returns [`ProvenanceError::SlideOutOfRange`] past the last slide
    pub fn remove_slide(&mut self, index: usize) -> Result<Slide, ProvenanceError> {
        if index >= self.slides.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.slides.remove(index))
    }

    /// Point the slide at `index` to `state`, or to nothing
    ///
    /// Returns the previous target.
    ///
    /// # Errors
    /// Returns [`ProvenanceError::SlideOutOfRange`] past the last slide
    pub fn retarget(&mut self, index: usize, state: Option<StateId>) -> Result<Option<StateId>, ProvenanceError> {
        let story = self.id;
        let slide = self
            .slides
            .get_mut(index)
            .ok_or(ProvenanceError::SlideOutOfRange { story, index })?;
        Ok(std::mem::replace(&mut slide.state, state))
    }

    /// States the slides point to, in order
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.slides.iter().filter_map(|s| s.state)
    }
}

fn story_title(title: &str) -> String {
    if title.trim().is_empty() {
        UNNAMED_STORY.to_owned()
    } else {
        title.to_owned()
    }
}

impl ProvenanceGraph {
    /// Build a story with one slide per state, optionally framed by a title
    /// slide and a closing slide
    ///
    /// # Errors
    /// Returns [`ProvenanceError::StateNotFound`] if a state is unknown
    pub fn extract_story(
        &self,
        title: &str,
        states: &[StateId],
        add_start_end: bool,
    ) -> Result<StoryId, ProvenanceError> {
        let title = story_title(title);
        let mut slides = Vec::with_capacity(states.len() + 2);
        if add_start_end {
            slides.push(Slide::text(title.clone(), title.clone()));
        }
        slides.extend(self.state_slides(states)?);
        if add_start_end {
            slides.push(Slide::text(END_SLIDE_TEXT, END_SLIDE_TEXT));
        }
        Ok(self.add_story(title, slides))
    }

    /// Start a story with a title slide, followed by one slide per state
    ///
    /// # Errors
    /// Returns [`ProvenanceError::StateNotFound`] if a state is unknown
    pub fn start_story(&self, title: &str, states: &[StateId]) -> Result<StoryId, ProvenanceError> {
        let title = story_title(title);
        let mut slides = vec![Slide::text(title.clone(), title.clone())];
        slides.extend(self.state_slides(states)?);
        Ok(self.add_story(title, slides))
    }

    /// Slide for each state, named after it
    fn state_slides(&self, states: &[StateId]) -> Result<Vec<Slide>, ProvenanceError> {
        let dag = self.inner.dag.read();
        states
            .iter()
            .map(|id| {
                let state = dag.state(*id).ok_or(ProvenanceError::StateNotFound(*id))?;
                let name = state.name.clone().unwrap_or_else(|| id.to_string());
                Ok(Slide::of_state(name, *id))
            })
            .collect()
    }

    fn add_story(&self, title: String, slides: Vec<Slide>) -> StoryId {
        let id: StoryId = self.inner.ids.next();
        self.inner.stories.write().insert(
            id,
            Story {
                id,
                title,
                slides,
            },
        );
        self.touch();
        self.inner.events.publish(GraphEvent::StoryAdded { story: id });
        id
    }

    /// Change a story in place
    ///
    /// `edit` works on a copy. The copy replaces the story only if `edit`
    /// succeeds and every slide still points to an existing state.
    ///
    /// # Errors
    /// Returns [`ProvenanceError::StoryNotFound`], the error of `edit`, or
    /// [`ProvenanceError::StateNotFound`] for a dangling slide
    pub fn edit_story<T>(
        &self,
        id: StoryId,
        edit: impl FnOnce(&mut Story) -> Result<T, ProvenanceError>,
    ) -> Result<T, ProvenanceError> {
        let mut story = self.story(id).ok_or(ProvenanceError::StoryNotFound(id))?;
        let out = edit(&mut story)?;
        {
            let dag = self.inner.dag.read();
            if let Some(missing) = story.states().find(|s| dag.state(*s).is_none()) {
                return Err(ProvenanceError::StateNotFound(missing));
            }
        }

        match self.inner.stories.write().get_mut(&id) {
            Some(slot) => *slot = story,
            None => return Err(ProvenanceError::StoryNotFound(id)),
        }
        self.touch();
        tracing::debug!(story = %id, "edited story");
        self.inner.events.publish(GraphEvent::StoryChanged { story: id });
        Ok(out)
    }

    /// Insert a slide before `index`
    ///
    /// # Errors
    /// See [`edit_story`](Self::edit_story)
    pub fn insert_slide(&self, story: StoryId, index: usize, slide: Slide) -> Result<(), ProvenanceError> {
        self.edit_story(story, |s| s.insert(index, slide))
    }

    /// Append a slide
    ///
    /// # Errors
    /// See [`edit_story`](Self::edit_story)
    pub fn append_slide(&self, story: StoryId, slide: Slide) -> Result<(), ProvenanceError> {
        self.edit_story(story, |s| {
            s.push(slide);
            Ok(())
        })
    }

    /// Move a slide within its story
    ///
    /// # Errors
    /// See [`edit_story`](Self::edit_story)
    pub fn move_slide(&self, story: StoryId, from: usize, to: usize) -> Result<(), ProvenanceError> {
        self.edit_story(story, |s| s.move_slide(from, to))
    }

    /// Remove a slide
    ///
    /// # Errors
    /// See [`edit_story`](Self::edit_story)
    pub fn remove_slide(&self, story: StoryId, index: usize) -> Result<Slide, ProvenanceError> {
        self.edit_story(story, |s| s.remove_slide(index))
    }

    /// Change the state a slide jumps to; `None` turns it into a text slide
    ///
    /// # Errors
    /// See [`edit_story`](Self::edit_story)
    pub fn set_slide_target(
        &self,
        story: StoryId,
        index: usize,
        state: Option<StateId>,
    ) -> Result<Option<StateId>, ProvenanceError> {
        self.edit_story(story, |s| s.retarget(index, state))
    }

    /// All stories in creation order
    #[must_use]
    pub fn stories(&self) -> Vec<Story> {
        self.inner.stories.read().values().cloned().collect()
    }

    /// Story by id
    #[must_use]
    pub fn story(&self, id: StoryId) -> Option<Story> {
        self.inner.stories.read().get(&id).cloned()
    }

    /// Remove a story
    ///
    /// # Errors
    /// Returns [`ProvenanceError::StoryNotFound`] if there is no such story
    pub fn remove_story(&self, id: StoryId) -> Result<Story, ProvenanceError> {
        let story = self
            .inner
            .stories
            .write()
            .shift_remove(&id)
            .ok_or(ProvenanceError::StoryNotFound(id))?;
        self.touch();
        self.inner.events.publish(GraphEvent::StoryRemoved { story: id });
        Ok(story)
    }

    /// Jump to the state of a slide. Text slides change nothing.
    ///
    /// # Errors
    /// Returns error if the story or slide does not exist, or the jump fails
    pub async fn play_slide(&self, story: StoryId, index: usize) -> Result<(), ProvenanceError> {
        let slide = {
            let stories = self.inner.stories.read();
            let s = stories.get(&story).ok_or(ProvenanceError::StoryNotFound(story))?;
            s.slides
                .get(index)
                .cloned()
                .ok_or(ProvenanceError::SlideOutOfRange { story, index })?
        };

        match slide.state {
            Some(state) => {
                tracing::info!(story = %story, index, state = %state, "playing slide");
                self.jump_to(state).await
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_slides_have_no_state() {
        let slide = Slide::text("Intro", "Hello");
        assert!(slide.is_text());
        assert!(!Slide::of_state("s", StateId(1)).is_text());
    }

    fn story(n: u64) -> Story {
        Story {
            id: StoryId(100),
            title: "t".into(),
            slides: (0..n).map(|i| Slide::of_state(i.to_string(), StateId(i))).collect(),
        }
    }

    fn order(story: &Story) -> Vec<u64> {
        story.slides.iter().filter_map(|s| s.state).map(StateId::get).collect()
    }

    #[test]
    fn slides_move_in_both_directions() {
        let mut s = story(4);
        s.move_slide(0, 2).unwrap();
        assert_eq!(order(&s), vec![1, 2, 0, 3]);
        s.move_slide(3, 0).unwrap();
        assert_eq!(order(&s), vec![3, 1, 2, 0]);
        assert!(matches!(
            s.move_slide(0, 4),
            Err(ProvenanceError::SlideOutOfRange { index: 4, .. })
        ));
        assert_eq!(order(&s), vec![3, 1, 2, 0]);
    }

    #[test]
    fn insert_accepts_the_end_only() {
        let mut s = story(2);
        s.insert(2, Slide::text("end", "bye")).unwrap();
        s.insert(0, Slide::text("intro", "hi")).unwrap();
        assert_eq!(s.slides.len(), 4);
        assert!(s.slides[0].is_text() && s.slides[3].is_text());
        assert!(s.insert(9, Slide::text("x", "x")).is_err());
    }

    #[test]
    fn retarget_returns_the_old_state() {
        let mut s = story(2);
        assert_eq!(s.retarget(1, Some(StateId(7))).unwrap(), Some(StateId(1)));
        assert_eq!(s.retarget(0, None).unwrap(), Some(StateId(0)));
        assert!(s.slides[0].is_text());
        assert_eq!(s.states().collect::<Vec<_>>(), vec![StateId(7)]);
        assert_eq!(s.remove_slide(0).unwrap().name, "0");
        assert!(s.remove_slide(1).is_err());
    }

    #[test]
    fn slides_serialize_optional_fields() {
        let slide = Slide::of_state("Start", StateId(0));
        let v = serde_json::to_value(&slide).unwrap();
        assert_eq!(v["state"], 0);
        assert!(v["text"].is_null());
    }
}
