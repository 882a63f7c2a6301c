//! Decred plugin command set.
//!
//! Payload schemas are owned by the voting/comment layer; here only the
//! command names and their classification matter.

use std::fmt;
use std::str::FromStr;

use crate::ProtoError;

pub const ID: &str = "decred";
pub const VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecredCommand {
    AuthorizeVote,
    StartVote,
    VoteDetails,
    VoteSummary,
    LoadVoteResults,
    Ballot,
    BestBlock,
    NewComment,
    LikeComment,
    CensorComment,
    GetComment,
    GetComments,
    GetNumComments,
    ProposalVotes,
    CommentLikes,
    ProposalCommentsLikes,
    Inventory,
    TokenInventory,
}

impl DecredCommand {
    pub const ALL: &'static [DecredCommand] = &[
        DecredCommand::AuthorizeVote,
        DecredCommand::StartVote,
        DecredCommand::VoteDetails,
        DecredCommand::VoteSummary,
        DecredCommand::LoadVoteResults,
        DecredCommand::Ballot,
        DecredCommand::BestBlock,
        DecredCommand::NewComment,
        DecredCommand::LikeComment,
        DecredCommand::CensorComment,
        DecredCommand::GetComment,
        DecredCommand::GetComments,
        DecredCommand::GetNumComments,
        DecredCommand::ProposalVotes,
        DecredCommand::CommentLikes,
        DecredCommand::ProposalCommentsLikes,
        DecredCommand::Inventory,
        DecredCommand::TokenInventory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DecredCommand::AuthorizeVote => "authorizevote",
            DecredCommand::StartVote => "startvote",
            DecredCommand::VoteDetails => "votedetails",
            DecredCommand::VoteSummary => "votesummary",
            DecredCommand::LoadVoteResults => "loadvoteresults",
            DecredCommand::Ballot => "ballot",
            DecredCommand::BestBlock => "bestblock",
            DecredCommand::NewComment => "newcomment",
            DecredCommand::LikeComment => "likecomment",
            DecredCommand::CensorComment => "censorcomment",
            DecredCommand::GetComment => "getcomment",
            DecredCommand::GetComments => "getcomments",
            DecredCommand::GetNumComments => "getnumcomments",
            DecredCommand::ProposalVotes => "proposalvotes",
            DecredCommand::CommentLikes => "commentlikes",
            DecredCommand::ProposalCommentsLikes => "proposalcommentslikes",
            DecredCommand::Inventory => "inventory",
            DecredCommand::TokenInventory => "tokeninventory",
        }
    }

    /// Commands that record new voting or comment data.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            DecredCommand::AuthorizeVote
                | DecredCommand::StartVote
                | DecredCommand::Ballot
                | DecredCommand::NewComment
                | DecredCommand::LikeComment
                | DecredCommand::CensorComment
                | DecredCommand::LoadVoteResults
        )
    }

    /// Mutations whose journaled payloads answer this query.
    pub fn sources(self) -> &'static [DecredCommand] {
        match self {
            DecredCommand::VoteDetails => &[DecredCommand::AuthorizeVote, DecredCommand::StartVote],
            DecredCommand::VoteSummary | DecredCommand::ProposalVotes => &[DecredCommand::Ballot],
            DecredCommand::GetComment
            | DecredCommand::GetComments
            | DecredCommand::GetNumComments => &[DecredCommand::NewComment],
            DecredCommand::CommentLikes | DecredCommand::ProposalCommentsLikes => {
                &[DecredCommand::LikeComment]
            }
            _ => &[],
        }
    }
}

impl fmt::Display for DecredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecredCommand {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecredCommand::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtoError::UnknownCommand {
                plugin: ID,
                command: s.to_string(),
            })
    }
}
