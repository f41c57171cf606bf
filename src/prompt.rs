/// Instruction sent ahead of every analysis payload. The reply format it asks
/// for is what `normalize` expects to find.
pub const ANALYSIS_PROMPT: &str = r#"
The following are the titles, posts and images of a personally run blog. Using the blog's titles, posts and images, assess whether the author can be identified and analyse the risk of personal information leaking as thoroughly as possible.

- Whenever personal information could leak under some condition, explain which post or image led to that judgement, what information can be inferred and how.
- Information that is never stated directly but can be inferred from several clues also counts as personal information.
- Combine the information from titles, posts and images when making predictions.
  For example, even if no age is mentioned, a post about recently graduating high school suggests the author is in their early twenties.
- Only predict personal information about the blog author, not about people or places around them.
  For example, a restaurant's phone number or a friend's name is not the author's information.
- Always analyse the images as well.

Answer in JSON.
Use "id" for the question number such as 1.1 or 1.2, "question" for the question itself, "answer" for the answer, "evidence" for the reasoning behind the answer, "source_texts" for the titles or post sentences the judgement was based on, and "source_images" for the URLs of the images the judgement was based on.

Example:

[
    {
        "id": "1.1",
        "question": "What is the blog author's name?",
        "answer": "Kim Chulsoo",
        "evidence": "The nickname 'Chulsoo' appears repeatedly across posts and the full name is exposed in one title.",
        "source_texts": [
            "Younghee accidentally called me Chulsoo today."
        ],
        "source_images": [
            "https://example.com/image1.jpg"
        ]
    },
    {
        "id": "1.4",
        "question": "What are the author's phone, card, passport or car numbers, or any password?",
        "answer": "Unknown",
        "evidence": "The posts contain no identifying numbers.",
        "source_texts": [],
        "source_images": []
    }
]

Evaluate personal information according to the conditions 1. to 5. below.

1. Exposure of personal identity
1.1 What is the blog author's name?
- Is the name mentioned?
- If not, can it be inferred from a nickname, alias, SNS ID or game ID?
1.2 What is the blog author's gender?
- Is the gender mentioned?
- Can it be inferred from emoticons, writing style, specific words or people who often appear in the feed?
1.3 What are the blog author's age and date of birth?
- Are they mentioned?
- Can an age range be inferred from a school, education, occupation or experience?
1.4 What are the author's own phone number, card number, passport number, car number or any password?
- Is any of this information mentioned or exposed?
- Is any part of it exposed?
1.5 Where does the blog author live?
- Is the residence mentioned or exposed directly?
- Can it be inferred from post content or image backgrounds (streets, landmarks, local shop names)? Can the place be told apart from a travel destination?

2. Health and medical information
2.1 What illnesses does the blog author have?
- Are illnesses mentioned or exposed?
- Can the state of health be inferred from hospital visits or prescriptions?
2.2 Does the blog author have a disability?
- Is a disability mentioned or exposed?
- Can it be inferred from hospital visits, aids or prescriptions?
2.3 What is the blog author's general state of health?
- Is it mentioned or exposed?
- Can it be inferred from hospital visits or prescriptions?

3. Location and access information
3.1 Which places does the blog author visit often?
- Are frequently visited places (cafes, gyms, workplace, school) exposed?
3.2 Where is the blog author's workplace?
- Is the commute mentioned or exposed, and can the workplace location be inferred from it?
- Is the workplace mentioned or exposed?

4. Social status
4.1 What is the blog author's education?
- Are schools or education mentioned or exposed?
- Can education be inferred from school names or admission and graduation years?
4.2 What is the blog author's major or occupation?
- Is it mentioned directly or inferable?
4.3 What are the blog author's family relationships?
- Is family mentioned or exposed?
4.4 What is the blog author's religion?
- Is a religious facility the author attends mentioned or exposed?
- Does the author mention their religion?
- Can the religion be predicted from religious remarks?
4.5 What are the blog author's political views?
- Does the author mention their political views?
- Has the author commented on political events, and do those comments reveal a leaning?

5. Hobbies and interests
5.1 What are the blog author's spending patterns?
- Which brands or shops does the author expose, and do they reveal a spending pattern?
- In which area does the author spend the most?
5.2 What are the blog author's hobbies?
- Can hobbies be inferred from frequently visited places, spending patterns or activities?
5.3 What is known about the blog author's pets?
- Does the author mention or expose their own pet?
- Can it be told that the pet belongs to the author rather than an acquaintance?
"#;
