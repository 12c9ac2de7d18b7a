use std::collections::HashMap;

use zel_core::prelude::*;

use crate::{
    error::RestructureError,
    ids::{BoardId, MemberId, TopicId},
    restructure::{
        collaborators::Permission, counters::ForumTotals, Actor, MergeCandidate, MergeRequest,
        Restructurer, SplitRequest,
    },
};

impl From<RestructureError> for ResourceError {
    fn from(error: RestructureError) -> Self {
        match error {
            RestructureError::DbError(_) => ResourceError::infra(error),
            RestructureError::DeadlineExceeded => ResourceError::infra(error),
            RestructureError::Validation(_) => ResourceError::app(error),
            RestructureError::Access => ResourceError::app(error),
        }
    }
}

/// Moderation RPC surface. Split and merge check the caller's permissions
/// here; the other calls go through the permission-filtered entry points.
#[derive(Clone)]
pub struct ModerationService {
    restructurer: Restructurer,
}

impl ModerationService {
    pub fn new(restructurer: Restructurer) -> Self {
        Self { restructurer }
    }

    async fn allowed_on(
        &self,
        actor: &Actor,
        permission: Permission,
        boards: impl IntoIterator<Item = BoardId>,
    ) -> bool {
        for board in boards {
            if !self
                .restructurer
                .permissions()
                .allowed(actor.member, permission, board)
                .await
            {
                return false;
            }
        }
        true
    }

    pub async fn _split(
        &self,
        member: MemberId,
        request: SplitRequest,
    ) -> Result<TopicId, RestructureError> {
        let actor = self.restructurer.actor(member);
        // A missing topic is reported by the split itself.
        if let Some(source) = self.restructurer.store().topic(request.source).await? {
            if !self
                .allowed_on(&actor, Permission::SplitAny, [source.board_id])
                .await
            {
                return Err(RestructureError::Access);
            }
        }
        self.restructurer.split(&actor, request).await
    }

    pub async fn _merge(
        &self,
        member: MemberId,
        request: MergeRequest,
    ) -> Result<TopicId, RestructureError> {
        let actor = self.restructurer.actor(member);
        let mut boards: Vec<BoardId> = self
            .restructurer
            .store()
            .topics(&request.topics)
            .await?
            .into_iter()
            .map(|topic| topic.board_id)
            .collect();
        boards.extend(request.target_board);
        boards.sort();
        boards.dedup();

        if !self.allowed_on(&actor, Permission::MergeAny, boards).await {
            return Err(RestructureError::Access);
        }
        self.restructurer.merge(&actor, request).await
    }
}

#[zel_service(name = "moderation")]
trait Moderation {
    #[doc = "Split the selected messages of a topic into a new topic"]
    #[method(name = "split")]
    async fn split(&self, member: MemberId, request: SplitRequest) -> Result<TopicId, ResourceError>;

    #[doc = "List topics on a board that could be merged"]
    #[method(name = "mergeable_topics")]
    async fn mergeable_topics(
        &self,
        board: BoardId,
        exclude: Option<TopicId>,
        only_approved: bool,
        offset: u64,
    ) -> Result<Vec<MergeCandidate>, ResourceError>;

    #[doc = "Merge topics into the first one given"]
    #[method(name = "merge")]
    async fn merge(&self, member: MemberId, request: MergeRequest) -> Result<TopicId, ResourceError>;

    #[doc = "Move topics to new boards, skipping those the member may not move"]
    #[method(name = "move_topics")]
    async fn move_topics(
        &self,
        member: MemberId,
        moves: Vec<(TopicId, BoardId)>,
    ) -> Result<Vec<TopicId>, ResourceError>;

    #[doc = "Remove or recycle topics, skipping those the member may not remove"]
    #[method(name = "remove_topics")]
    async fn remove_topics(
        &self,
        member: MemberId,
        topics: Vec<TopicId>,
    ) -> Result<Vec<TopicId>, ResourceError>;

    #[doc = "Toggle the sticky flag"]
    #[method(name = "toggle_sticky")]
    async fn toggle_sticky(
        &self,
        member: MemberId,
        topics: Vec<TopicId>,
    ) -> Result<Vec<TopicId>, ResourceError>;

    #[doc = "Toggle the lock state"]
    #[method(name = "toggle_lock")]
    async fn toggle_lock(
        &self,
        member: MemberId,
        topics: Vec<TopicId>,
    ) -> Result<Vec<TopicId>, ResourceError>;

    #[doc = "Recount topic, board and forum totals"]
    #[method(name = "resync")]
    async fn resync(&self, member: MemberId) -> Result<ForumTotals, ResourceError>;
}

#[async_trait]
impl ModerationServer for ModerationService {
    async fn split(
        &self,
        _ctx: RequestContext,
        member: MemberId,
        request: SplitRequest,
    ) -> Result<TopicId, ResourceError> {
        Ok(self._split(member, request).await?)
    }

    async fn mergeable_topics(
        &self,
        _ctx: RequestContext,
        board: BoardId,
        exclude: Option<TopicId>,
        only_approved: bool,
        offset: u64,
    ) -> Result<Vec<MergeCandidate>, ResourceError> {
        let candidates = self
            .restructurer
            .mergeable_topics(board, exclude, only_approved, offset)
            .await?;
        Ok(candidates)
    }

    async fn merge(
        &self,
        _ctx: RequestContext,
        member: MemberId,
        request: MergeRequest,
    ) -> Result<TopicId, ResourceError> {
        Ok(self._merge(member, request).await?)
    }

    async fn move_topics(
        &self,
        _ctx: RequestContext,
        member: MemberId,
        moves: Vec<(TopicId, BoardId)>,
    ) -> Result<Vec<TopicId>, ResourceError> {
        let actor = self.restructurer.actor(member);
        let destinations: HashMap<TopicId, BoardId> = moves.into_iter().collect();
        let moved = self
            .restructurer
            .move_permissions_filtered(&actor, &destinations)
            .await?;
        Ok(moved)
    }

    async fn remove_topics(
        &self,
        _ctx: RequestContext,
        member: MemberId,
        topics: Vec<TopicId>,
    ) -> Result<Vec<TopicId>, ResourceError> {
        let actor = self.restructurer.actor(member);
        let removed = self
            .restructurer
            .remove_permissions_filtered(&actor, &topics)
            .await?;
        Ok(removed)
    }

    async fn toggle_sticky(
        &self,
        _ctx: RequestContext,
        member: MemberId,
        topics: Vec<TopicId>,
    ) -> Result<Vec<TopicId>, ResourceError> {
        let actor = self.restructurer.actor(member);
        Ok(self.restructurer.toggle_sticky(&actor, &topics).await?)
    }

    async fn toggle_lock(
        &self,
        _ctx: RequestContext,
        member: MemberId,
        topics: Vec<TopicId>,
    ) -> Result<Vec<TopicId>, ResourceError> {
        let actor = self.restructurer.actor(member);
        Ok(self.restructurer.toggle_lock(&actor, &topics).await?)
    }

    async fn resync(&self, _ctx: RequestContext, member: MemberId) -> Result<ForumTotals, ResourceError> {
        let actor = self.restructurer.actor(member);
        Ok(self.restructurer.resync(&actor).await?)
    }
}
